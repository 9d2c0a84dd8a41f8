//! Cache directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for the cache directory layout:
//!
//! ```text
//! ~/.cache/refmirror/
//! ├── repos/
//! │   ├── <owner>-<repo>/                    # Mirror clone
//! │   ├── <owner>-<repo>.git-lock            # Serializes clone/fetch
//! │   └── <owner>-<repo>.clone-tmp/          # In-progress clone
//! └── checkouts/
//!     ├── <owner>-<repo>-<ref>/              # Working tree at one ref
//!     ├── <owner>-<repo>-<ref>.git-lock      # flock-based locking
//!     ├── <owner>-<repo>-<ref>.commit-hash   # Last materialized commit
//!     └── <owner>-<repo>-<ref>.index         # Git index for the work tree
//! ```
//!
//! Each component is escaped so `%`, `-`, `.` and `/` never appear raw: an
//! unescaped `-` is always a separator and an unescaped `.` always starts a
//! sidecar suffix.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::types::RepoKey;

/// Manages all filesystem paths for the cache directory layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

fn escape_into(out: &mut String, component: &str) {
    for c in component.chars() {
        match c {
            '%' | '-' | '.' | '/' => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
}

fn repo_name(key: &RepoKey) -> String {
    let mut name = String::new();
    escape_into(&mut name, key.owner.as_str());
    name.push('-');
    escape_into(&mut name, key.repo.as_str());
    name
}

fn with_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut name: OsString = path.into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the mirrors directory path: `{root}/repos`
    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    /// Returns the checkouts directory path: `{root}/checkouts`
    pub fn checkouts_dir(&self) -> PathBuf {
        self.root.join("checkouts")
    }

    /// Returns the mirror directory for a repository: `{root}/repos/{owner}-{repo}`
    pub fn mirror_dir(&self, key: &RepoKey) -> PathBuf {
        self.repos_dir().join(repo_name(key))
    }

    /// Lock guarding every write to the mirror: `{mirror}.git-lock`
    pub fn mirror_lock_path(&self, key: &RepoKey) -> PathBuf {
        with_suffix(self.mirror_dir(key), ".git-lock")
    }

    /// Where a first clone is assembled before being renamed into place.
    pub fn mirror_staging_dir(&self, key: &RepoKey) -> PathBuf {
        with_suffix(self.mirror_dir(key), ".clone-tmp")
    }

    /// Returns the checkout directory: `{root}/checkouts/{owner}-{repo}-{ref}`
    pub fn checkout_dir(&self, key: &RepoKey, reference: &str) -> PathBuf {
        let mut name = repo_name(key);
        name.push('-');
        escape_into(&mut name, reference);
        self.checkouts_dir().join(name)
    }

    /// Returns the lock file path: `{checkout}.git-lock`
    pub fn lock_path(&self, key: &RepoKey, reference: &str) -> PathBuf {
        with_suffix(self.checkout_dir(key, reference), ".git-lock")
    }

    /// Returns the commit hash sidecar path: `{checkout}.commit-hash`
    pub fn commit_hash_path(&self, key: &RepoKey, reference: &str) -> PathBuf {
        with_suffix(self.checkout_dir(key, reference), ".commit-hash")
    }

    /// Returns the private git index for a checkout: `{checkout}.index`
    pub fn index_path(&self, key: &RepoKey, reference: &str) -> PathBuf {
        with_suffix(self.checkout_dir(key, reference), ".index")
    }
}

impl Default for CachePaths {
    /// Creates a CachePaths using the system cache directory + "refmirror"
    ///
    /// Uses `dirs::cache_dir()` which resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("refmirror"))
    }
}
