//! Content cache for module proxy servers
//!
//! Defines the [`Cacher`] contract a proxy uses to look up, store and bulk
//! ingest module files, and [`DirCacher`], a backend keeping one file per
//! name under a local directory. Writes are staged beside their target and
//! published with an atomic rename, so readers never see partial files.

mod archive;
mod cacher;
mod dir;
mod error;
mod name;
mod types;

pub use cacher::{ArchiveStream, CachedContent, Cacher, SeekableContent};
pub use dir::{CachedFile, DirCacher};
pub use error::{CacheError, Result};
pub use name::translate;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    DirCacherConfig, SyncKind, SyncReport, DIR_MODE, FILE_MODE, GZIP_MEDIA_TYPE, LOCK_SUFFIX,
    TAR_MEDIA_TYPE,
};
