//! Logical name to filesystem path translation

use crate::error::{CacheError, Result};
use std::path::{Component, Path, PathBuf};

/// Join a slash-separated logical name under `root`.
///
/// Empty and `.` segments are dropped. Names that could step outside
/// `root` (`..`, drive prefixes, backslashes, NUL) are rejected, as are
/// names with no segments left.
pub fn translate(root: &Path, name: &str) -> Result<PathBuf> {
    let invalid = || CacheError::InvalidName(name.to_string());

    let mut path = root.to_path_buf();
    let mut segments = 0usize;

    for segment in name.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment.contains('\\') || segment.contains('\0') {
            return Err(invalid());
        }

        // A segment must be exactly one normal component on this host.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(invalid()),
        }

        path.push(segment);
        segments += 1;
    }

    if segments == 0 {
        return Err(invalid());
    }
    Ok(path)
}
