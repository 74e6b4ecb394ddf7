//! Cache backed by a directory on the local disk
//!
//! Every write goes through a staging file created next to its target and
//! is published with a single rename, so readers only ever see complete
//! files.

use crate::archive;
use crate::cacher::{ArchiveStream, CachedContent, Cacher, SeekableContent};
use crate::error::{CacheError, Result};
use crate::name::translate;
use crate::types::{DirCacherConfig, SyncKind, SyncReport, DIR_MODE, FILE_MODE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, Read, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::{NamedTempFile, TempPath};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWriteExt, ReadBuf};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// A [`Cacher`] storing one file per name under a root directory.
///
/// Directories are created with 0755 permissions and files with 0644.
#[derive(Debug, Clone)]
pub struct DirCacher {
    root: PathBuf,
}

impl DirCacher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &DirCacherConfig) -> Self {
        Self::new(config.cache_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Initialize the cache by ensuring the root directory exists
    pub async fn init(&self) -> Result<()> {
        create_dirs(&self.root).await?;
        info!(cache_dir = ?self.root, "Cache initialized");
        Ok(())
    }

    /// Native path for a logical name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        translate(&self.root, name)
    }

    /// Store a forward-only stream under `name`.
    ///
    /// Blocking counterpart of [`Cacher::put`] used for archive entries.
    /// When `expected_len` is given, a source that ends early is treated as
    /// truncated and nothing is published.
    pub fn write_stream<R: Read + ?Sized>(
        &self,
        name: &str,
        source: &mut R,
        expected_len: Option<u64>,
    ) -> Result<u64> {
        let target = self.path_for(name)?;
        let dir = parent_dir(&target)?;
        create_dirs_blocking(dir)?;

        let (mut file, staging) = staging_file(&target, dir)?.into_parts();
        let written = copy_from_source(source, &mut file)?;
        if let Some(expected) = expected_len {
            if written != expected {
                return Err(CacheError::Decode(format!(
                    "entry {} truncated: expected {} bytes, got {}",
                    name, expected, written
                )));
            }
        }
        file.flush()?;
        drop(file);

        set_file_mode_blocking(&staging)?;
        publish(staging, &target)?;

        debug!(name = %name, bytes = written, "Stored cache entry");
        Ok(written)
    }
}

#[async_trait]
impl Cacher for DirCacher {
    async fn get(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Box<dyn CachedContent>> {
        ensure_active(cancel)?;
        let path = self.path_for(name)?;

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
            {
                debug!(name = %name, "Cache miss");
                return Err(CacheError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(CacheError::NotFound(name.to_string()));
        }

        debug!(name = %name, size = metadata.len(), "Cache hit");
        Ok(Box::new(CachedFile { file, metadata }))
    }

    async fn put(
        &self,
        cancel: &CancellationToken,
        name: &str,
        content: &mut dyn SeekableContent,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let target = self.path_for(name)?;
        let dir = parent_dir(&target)?;
        create_dirs(dir).await?;

        let (file, staging) = staging_file(&target, dir)?.into_parts();
        let mut file = File::from_std(file);

        content.seek(SeekFrom::Start(0)).await?;
        let written = tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        drop(file);

        // Last chance to back out before the entry becomes visible.
        ensure_active(cancel)?;

        set_file_mode(&staging).await?;
        tokio::task::spawn_blocking(move || publish(staging, &target)).await??;

        debug!(name = %name, bytes = written, "Stored cache entry");
        Ok(())
    }

    async fn sync(
        &self,
        cancel: &CancellationToken,
        stream: ArchiveStream,
        kind: &str,
    ) -> Result<SyncReport> {
        ensure_active(cancel)?;
        let kind: SyncKind = kind.parse()?;

        let reader = SyncIoBridge::new(stream);
        let cacher = self.clone();
        let token = cancel.clone();
        let report =
            tokio::task::spawn_blocking(move || archive::ingest(&cacher, &token, reader, kind))
                .await??;

        info!(
            cache_dir = ?self.root,
            kind = kind.media_type(),
            committed = report.committed.len(),
            skipped = report.skipped,
            bytes = report.bytes_written,
            "Cache directory synced"
        );
        Ok(report)
    }
}

/// An open cache file together with its metadata
pub struct CachedFile {
    file: File,
    metadata: std::fs::Metadata,
}

impl AsyncRead for CachedFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for CachedFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

impl CachedContent for CachedFile {
    fn seekable(&mut self) -> Option<&mut dyn SeekableContent> {
        Some(self)
    }

    fn mod_time(&self) -> Option<DateTime<Utc>> {
        self.metadata.modified().ok().map(DateTime::<Utc>::from)
    }

    fn size(&self) -> Option<u64> {
        Some(self.metadata.len())
    }
}

pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }
    Ok(())
}

fn parent_dir(target: &Path) -> Result<&Path> {
    target.parent().ok_or_else(|| {
        CacheError::InvalidName(target.to_string_lossy().into_owned())
    })
}

/// Create a staging file beside `target`, removed again when dropped.
fn staging_file(target: &Path, dir: &Path) -> Result<NamedTempFile> {
    let base = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}.tmp.", base))
        .tempfile_in(dir)?;
    Ok(staging)
}

fn publish(staging: TempPath, target: &Path) -> Result<()> {
    staging
        .persist(target)
        .map_err(|e| CacheError::from(e.error))
}

fn copy_from_source<R: Read + ?Sized, W: Write>(source: &mut R, sink: &mut W) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CacheError::from_archive(e)),
        };
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
}

async fn create_dirs(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}

fn create_dirs_blocking(dir: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}

#[cfg(unix)]
async fn set_file_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE)).await
}

#[cfg(not(unix))]
async fn set_file_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode_blocking(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))
}

#[cfg(not(unix))]
fn set_file_mode_blocking(_path: &Path) -> io::Result<()> {
    Ok(())
}
