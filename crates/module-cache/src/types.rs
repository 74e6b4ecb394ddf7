//! Cache types

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Permission bits for cache directories (Unix).
pub const DIR_MODE: u32 = 0o755;
/// Permission bits for stored cache files (Unix).
pub const FILE_MODE: u32 = 0o644;

/// Archive entries with this suffix are the producer's lock files.
pub const LOCK_SUFFIX: &str = ".lock";

pub const GZIP_MEDIA_TYPE: &str = "application/gzip";
pub const TAR_MEDIA_TYPE: &str = "application/x-tar";

/// How a sync stream is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Plain tar archive
    Tar,
    /// Gzip-compressed tar archive
    Gzip,
}

impl SyncKind {
    /// Match a media type, ignoring ASCII case and any parameters.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(GZIP_MEDIA_TYPE) {
            Some(SyncKind::Gzip)
        } else if essence.eq_ignore_ascii_case(TAR_MEDIA_TYPE) {
            Some(SyncKind::Tar)
        } else {
            None
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            SyncKind::Tar => TAR_MEDIA_TYPE,
            SyncKind::Gzip => GZIP_MEDIA_TYPE,
        }
    }
}

impl FromStr for SyncKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncKind::from_media_type(s).ok_or_else(|| CacheError::UnsupportedSyncType(s.to_string()))
    }
}

/// Outcome of a successful sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Logical names written, in archive order
    pub committed: Vec<String>,
    /// Directory markers, lock files and non-regular entries
    pub skipped: usize,
    pub bytes_written: u64,
}

/// Configuration for a [`crate::DirCacher`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirCacherConfig {
    pub cache_dir: PathBuf,
}

impl DirCacherConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        }
    }
}

impl Default for DirCacherConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/modules"),
        }
    }
}
