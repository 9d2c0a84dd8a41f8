//! Freshness checks for mirrors and checkouts.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Check if a path was touched within `max_age`.
///
/// Returns false if:
/// - The path doesn't exist
/// - Its modification time is older than `max_age`
/// - We can't read its metadata (treat as stale to be safe)
pub fn is_fresh(path: &Path, max_age: Duration) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    let modified = match metadata.modified() {
        Ok(t) => t,
        Err(_) => return false,
    };

    let now = SystemTime::now();
    let threshold = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    modified >= threshold
}

/// Reset the freshness clock of a file or directory to now.
pub fn touch(path: &Path) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::now())
}
