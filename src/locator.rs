//! Finding raw artifacts inside a crash directory by file-name pattern.
//!
//! Patterns are searched (not anchored) against the bare file name. The
//! listing is not recursive and follows the order the filesystem returns,
//! so when several files match the winner is not deterministic; artifact
//! naming is distinctive enough in practice that callers rely on it.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First entry of `dir` whose file name matches `pattern`.
///
/// An unreadable directory is treated like an empty one.
pub fn find_artifact(pattern: &Regex, dir: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "cannot list artifact directory");
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .find(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| dir.join(entry.file_name()))
}

/// First pattern (in order) that locates an artifact, e.g. gzip before plain.
pub fn find_first_artifact(patterns: &[&Regex], dir: &Path) -> Option<PathBuf> {
    patterns
        .iter()
        .find_map(|pattern| find_artifact(pattern, dir))
}
