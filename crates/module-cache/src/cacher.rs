//! The cache contract shared by every storage backend
//!
//! A proxy server talks to its cache only through [`Cacher`]. Backends
//! decide how names map to storage; the proxy decides how names map to
//! requests and how returned content is served.

use crate::error::Result;
use crate::types::SyncReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::sync::CancellationToken;

/// A readable, seekable byte source.
///
/// Implemented for anything that is `AsyncRead + AsyncSeek`, including
/// `tokio::fs::File` and `std::io::Cursor`.
pub trait SeekableContent: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableContent for T {}

/// A forward-only archive stream handed to [`Cacher::sync`].
pub type ArchiveStream = Box<dyn AsyncRead + Send + Unpin>;

/// Content returned by [`Cacher::get`].
///
/// Reading is mandatory; dropping the handle closes it. Everything else is
/// an optional capability the serving layer probes independently and
/// falls back from gracefully when absent.
pub trait CachedContent: AsyncRead + Send + Unpin {
    /// Random access for Range requests.
    fn seekable(&mut self) -> Option<&mut dyn SeekableContent> {
        None
    }

    /// Value for the Last-Modified header and the If-Modified-Since,
    /// If-Unmodified-Since and If-Range checks.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Same as [`CachedContent::last_modified`] but with lower priority.
    fn mod_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Strong validator for the ETag header and the If-Match,
    /// If-None-Match and If-Range checks.
    ///
    /// The value must already comply with RFC 7232, section 2.3; callers
    /// use it verbatim.
    fn etag(&self) -> Option<&str> {
        None
    }

    /// Total length in bytes, when known.
    fn size(&self) -> Option<u64> {
        None
    }

    /// The effective modification time: `last_modified`, then `mod_time`.
    fn modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified().or_else(|| self.mod_time())
    }
}

/// Storage backend for module proxy files.
///
/// Every operation takes a [`CancellationToken`]; implementations check it
/// on entry and, for long-running work, between units of work.
#[async_trait]
pub trait Cacher: Send + Sync {
    /// Open the cached content for `name`.
    ///
    /// Fails with [`crate::CacheError::NotFound`] when nothing is cached
    /// under `name`, so callers can answer "does not exist" instead of
    /// reporting a broken cache.
    async fn get(&self, cancel: &CancellationToken, name: &str)
        -> Result<Box<dyn CachedContent>>;

    /// Store `content` under `name`, replacing any previous entry.
    ///
    /// The source is rewound before copying. On failure the previous
    /// entry, if any, is left untouched.
    async fn put(
        &self,
        cancel: &CancellationToken,
        name: &str,
        content: &mut dyn SeekableContent,
    ) -> Result<()>;

    /// Ingest every file of an archive stream.
    ///
    /// `kind` is a media type naming the encoding (`application/x-tar` or
    /// `application/gzip`); anything else fails before the stream is read.
    /// Directory entries and lock files are skipped. The first error aborts
    /// the sync; entries committed before it stay in the cache.
    async fn sync(
        &self,
        cancel: &CancellationToken,
        archive: ArchiveStream,
        kind: &str,
    ) -> Result<SyncReport>;
}
