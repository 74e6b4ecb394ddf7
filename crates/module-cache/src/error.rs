//! Error types for the module cache

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CacheError {
    /// No entry exists for the requested name.
    NotFound(String),
    /// The logical name cannot be mapped under the cache root.
    InvalidName(String),
    UnsupportedSyncType(String),
    /// Malformed, truncated or otherwise undecodable archive data.
    Decode(String),
    Io(Box<io::Error>),
    Cancelled,
}

impl CacheError {
    /// Whether this error means "no such entry" rather than a broken cache.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Classify an error raised while reading an archive stream.
    ///
    /// The tar and gzip decoders report format problems as `io::Error`s;
    /// those become [`CacheError::Decode`], anything else stays an I/O error.
    /// `Other` counts as a format problem because tar raises checksum and
    /// header errors with that kind. Read errors of the archive stream itself
    /// are split off before reaching here (see `archive::ingest`).
    pub(crate) fn from_archive(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => CacheError::Decode(err.to_string()),
            _ => CacheError::Io(Box::new(err)),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound(name) => write!(f, "Cache entry not found: {}", name),
            CacheError::InvalidName(name) => write!(f, "Invalid cache name: {:?}", name),
            CacheError::UnsupportedSyncType(kind) => {
                write!(f, "Unsupported cache-directory sync type: {}", kind)
            }
            CacheError::Decode(msg) => write!(f, "Archive decode error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Io(Box::new(io::Error::other(err)))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
