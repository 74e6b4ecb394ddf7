//! Subcommand implementations, written against the `Cacher` contract

use crate::error::{CliError, Result};
use module_cache::{
    ArchiveStream, CancellationToken, Cacher, SyncReport, GZIP_MEDIA_TYPE, TAR_MEDIA_TYPE,
};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Copy the entry for `name` into `out`, returning the byte count.
pub async fn get<W>(
    cacher: &dyn Cacher,
    cancel: &CancellationToken,
    name: &str,
    out: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut content = cacher.get(cancel, name).await?;
    if let Some(modified) = content.modified() {
        debug!(name = %name, modified = %modified, "Serving cached entry");
    }
    let copied = tokio::io::copy(&mut content, &mut *out).await?;
    out.flush().await?;
    Ok(copied)
}

pub async fn put(
    cacher: &dyn Cacher,
    cancel: &CancellationToken,
    name: &str,
    file: &Path,
) -> Result<()> {
    let mut source = File::open(file).await?;
    cacher.put(cancel, name, &mut source).await?;
    info!(name = %name, file = ?file, "Stored cache entry");
    Ok(())
}

/// Ingest an archive file, or stdin when `archive` is `-`.
pub async fn sync(
    cacher: &dyn Cacher,
    cancel: &CancellationToken,
    archive: &Path,
    kind: Option<&str>,
) -> Result<SyncReport> {
    let from_stdin = archive == Path::new("-");
    let kind = match kind {
        Some(kind) => kind.to_string(),
        None if from_stdin => {
            return Err(CliError::Config(
                "--kind is required when reading from stdin".to_string(),
            ))
        }
        None => infer_kind(archive)
            .ok_or_else(|| {
                CliError::Config(format!(
                    "cannot infer archive kind from {:?}; pass --kind",
                    archive
                ))
            })?
            .to_string(),
    };

    let stream: ArchiveStream = if from_stdin {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(File::open(archive).await?)
    };

    info!(archive = ?archive, kind = %kind, "Syncing cache directory");
    Ok(cacher.sync(cancel, stream, &kind).await?)
}

/// Media type for an archive path, judged by its extension
pub fn infer_kind(path: &Path) -> Option<&'static str> {
    let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        Some(GZIP_MEDIA_TYPE)
    } else if file_name.ends_with(".tar") {
        Some(TAR_MEDIA_TYPE)
    } else {
        None
    }
}
