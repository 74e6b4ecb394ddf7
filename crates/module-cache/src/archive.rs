//! Bulk ingestion of tar and tar.gz streams into a [`DirCacher`]

use crate::dir::{ensure_active, DirCacher};
use crate::error::{CacheError, Result};
use crate::types::{SyncKind, SyncReport, LOCK_SUFFIX};
use flate2::read::MultiGzDecoder;
use std::cell::RefCell;
use std::io::{self, Read};
use tar::{Archive, Entry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Decode `reader` according to `kind` and store every regular file.
///
/// Runs on a blocking thread. Stops at the first error; files written
/// before it stay in the cache. Gzip input may hold several members, all
/// of which are read. A failure of `reader` itself is reported as
/// [`CacheError::Io`], never as undecodable data.
pub(crate) fn ingest<R: Read>(
    cacher: &DirCacher,
    cancel: &CancellationToken,
    reader: R,
    kind: SyncKind,
) -> Result<SyncReport> {
    let source_error = RefCell::new(None);
    let source = SourceReader {
        inner: reader,
        error: &source_error,
    };

    let result = match kind {
        SyncKind::Gzip => unpack(cacher, cancel, MultiGzDecoder::new(source)),
        SyncKind::Tar => unpack(cacher, cancel, source),
    };

    result.map_err(|err| match source_error.take() {
        Some(io_err) => CacheError::from(io_err),
        None => err,
    })
}

/// Keeps the first read error of the underlying stream, so it can be told
/// apart from decoder errors once it has passed through tar and gzip.
struct SourceReader<'a, R> {
    inner: R,
    error: &'a RefCell<Option<io::Error>>,
}

impl<R: Read> Read for SourceReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::Interrupted {
                return err;
            }
            let surfaced = io::Error::new(err.kind(), err.to_string());
            let mut slot = self.error.borrow_mut();
            if slot.is_none() {
                *slot = Some(err);
            }
            surfaced
        })
    }
}

fn unpack<R: Read>(
    cacher: &DirCacher,
    cancel: &CancellationToken,
    reader: R,
) -> Result<SyncReport> {
    let mut archive = Archive::new(reader);
    let mut report = SyncReport::default();

    for entry in archive.entries().map_err(CacheError::from_archive)? {
        ensure_active(cancel)?;

        let mut entry = entry.map_err(CacheError::from_archive)?;
        let name = entry_name(&entry)?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() || name.ends_with('/') {
            trace!(name = %name, "Skipping directory entry");
            report.skipped += 1;
            continue;
        }
        if name.ends_with(LOCK_SUFFIX) {
            debug!(name = %name, "Skipping lock file");
            report.skipped += 1;
            continue;
        }
        if !entry_type.is_file() {
            warn!(name = %name, entry_type = ?entry_type, "Skipping non-regular archive entry");
            report.skipped += 1;
            continue;
        }

        let expected = entry.size();
        let written = cacher.write_stream(&name, &mut entry, Some(expected))?;
        report.bytes_written += written;
        report.committed.push(name);
    }

    Ok(report)
}

fn entry_name<R: Read>(entry: &Entry<'_, R>) -> Result<String> {
    let path = entry.path().map_err(CacheError::from_archive)?;
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| CacheError::Decode(format!("entry name is not UTF-8: {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, EntryType, Header};
    use tempfile::tempdir;

    fn file_header(path: &str, size: usize) -> Header {
        let mut header = Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(size as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        header
    }

    fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (path, content) in files {
            let header = file_header(path, content.len());
            builder.append(&header, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_ingest_plain_tar() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let tar = build_tar(&[("a/b.info", b"{}"), ("a/b.mod", b"module a/b\n")]);

        let report = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Tar).unwrap();

        assert_eq!(report.committed, vec!["a/b.info", "a/b.mod"]);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.bytes_written, 13);
        assert_eq!(
            std::fs::read(dir.path().join("a").join("b.mod")).unwrap(),
            b"module a/b\n"
        );
    }

    #[test]
    fn test_ingest_gzip_tar() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let tar = gzip(&build_tar(&[("x", b"hello")]));

        let report = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Gzip).unwrap();

        assert_eq!(report.committed, vec!["x"]);
        assert_eq!(std::fs::read(dir.path().join("x")).unwrap(), b"hello");
    }

    #[test]
    fn test_ingest_reads_every_gzip_member() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let tar = build_tar(&[("a", b"first"), ("b", b"second")]);
        // Split after the first entry, as `cat a.gz b.gz` would produce.
        let mut stream = gzip(&tar[..1024]);
        stream.extend(gzip(&tar[1024..]));

        let report = ingest(&cacher, &CancellationToken::new(), &stream[..], SyncKind::Gzip).unwrap();

        assert_eq!(report.committed, vec!["a", "b"]);
        assert_eq!(std::fs::read(dir.path().join("b")).unwrap(), b"second");
    }

    #[test]
    fn test_ingest_reports_stream_failure_as_io() {
        struct Dropped;

        impl Read for Dropped {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("connection dropped"))
            }
        }

        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let tar = build_tar(&[("a", &[b'x'; 600])]);
        // Header plus part of the body, then the transport fails.
        let reader = (&tar[..700]).chain(Dropped);

        let err = ingest(&cacher, &CancellationToken::new(), reader, SyncKind::Tar).unwrap_err();

        match err {
            CacheError::Io(io_err) => assert_eq!(io_err.to_string(), "connection dropped"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_ingest_skips_symlinks() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());

        let mut builder = Builder::new(Vec::new());
        let mut link = Header::new_gnu();
        link.set_path("pkg/latest").unwrap();
        link.set_entry_type(EntryType::Symlink);
        link.set_link_name("a.txt").unwrap();
        link.set_size(0);
        link.set_cksum();
        builder.append(&link, std::io::empty()).unwrap();
        builder
            .append(&file_header("pkg/a.txt", 3), &b"abc"[..])
            .unwrap();
        let tar = builder.into_inner().unwrap();

        let report = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Tar).unwrap();

        assert_eq!(report.committed, vec!["pkg/a.txt"]);
        assert_eq!(report.skipped, 1);
        assert!(!dir.path().join("pkg").join("latest").exists());
    }

    #[test]
    fn test_ingest_rejects_truncated_body() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let body = vec![b'z'; 2000];
        let mut tar = build_tar(&[("first", b"ok"), ("second", body.as_slice())]);
        // Keep both headers but only part of the second body.
        tar.truncate(512 * 3 + 100);

        let err = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Tar).unwrap_err();

        assert!(matches!(err, CacheError::Decode(_)), "got {err:?}");
        assert_eq!(std::fs::read(dir.path().join("first")).unwrap(), b"ok");
        assert!(!dir.path().join("second").exists());
    }

    #[test]
    fn test_ingest_stops_on_corrupt_header() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let mut tar = build_tar(&[("first", b"ok"), ("second", b"never")]);
        // Clobber the checksum field of the second header.
        tar[1024 + 148..1024 + 156].copy_from_slice(b"0000000\0");

        let err = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Tar).unwrap_err();

        assert!(matches!(err, CacheError::Decode(_)), "got {err:?}");
        assert!(dir.path().join("first").exists());
        assert!(!dir.path().join("second").exists());
    }

    #[test]
    fn test_ingest_rejects_garbage_gzip() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());

        let err = ingest(
            &cacher,
            &CancellationToken::new(),
            &b"definitely not gzip data"[..],
            SyncKind::Gzip,
        )
        .unwrap_err();

        assert!(matches!(err, CacheError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn test_ingest_rejects_escaping_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let cacher = DirCacher::new(&root);

        let mut header = Header::new_old();
        header.as_old_mut().name[..10].copy_from_slice(b"../escaped");
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        let mut builder = Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let tar = builder.into_inner().unwrap();

        let err = ingest(&cacher, &CancellationToken::new(), &tar[..], SyncKind::Tar).unwrap_err();

        assert!(matches!(err, CacheError::InvalidName(_)), "got {err:?}");
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn test_ingest_checks_cancellation_between_entries() {
        let dir = tempdir().unwrap();
        let cacher = DirCacher::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tar = build_tar(&[("x", b"hello")]);

        let err = ingest(&cacher, &cancel, &tar[..], SyncKind::Tar).unwrap_err();

        assert!(matches!(err, CacheError::Cancelled));
        assert!(!dir.path().join("x").exists());
    }
}
