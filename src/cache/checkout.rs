//! Checkout synchronizer
//!
//! `CheckoutSync::prepare` guarantees that a local directory reflects exactly
//! the tree of one ref. A fresh checkout is reused without touching the
//! network. Otherwise the ref is confirmed against the GitHub API, and the
//! mirror refresh and tree write run under a lock scoped to the checkout path.
//! Clone and fetch additionally hold a lock scoped to the mirror, which every
//! ref of the repository shares.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::git::{GitAuth, GitCli, GitError, Vcs, validate_git_ref};
use super::{CachePaths, CheckoutLock, is_fresh, touch};
use crate::github::{GitHubApi, is_commit_shaped};
use crate::http::HttpError;
use crate::types::RepoKey;

pub const DEFAULT_REMOTE_BASE: &str = "https://github.com";

/// Checkouts touched within this window are reused as-is.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by checkout preparation.
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// GitHub wants authentication for this repository.
    #[error("repository is private; authentication required")]
    PrivateRepoAccess,
    /// The repository or ref does not exist.
    #[error("repository or ref not found")]
    RepoNotFound,
    /// GitHub answered with a status we don't classify.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    /// The API call itself failed.
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] GitError),
    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What `prepare` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Checkout was within its freshness window; nothing was contacted.
    Fresh,
    /// Mirror refreshed, ref still at the recorded commit; tree untouched.
    Unchanged,
    /// Work tree (re)written.
    Written,
}

/// A prepared checkout.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub path: PathBuf,
    /// Commit the tree reflects. `None` for a fresh hit, which reads nothing.
    pub commit: Option<String>,
    pub outcome: PrepareOutcome,
}

/// Maintains repository mirrors and per-ref checkouts.
pub struct CheckoutSync {
    paths: CachePaths,
    api: Arc<GitHubApi>,
    vcs: Box<dyn Vcs>,
    remote_base: String,
    max_age: Duration,
}

fn read_commit_hash(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove `path`, whether it is a directory or a file. Missing is fine.
fn discard(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn discard_logged(path: &Path) {
    if let Err(e) = discard(path) {
        log::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Remove everything inside `dir` so files dropped upstream don't linger.
fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fs::symlink_metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

impl CheckoutSync {
    /// Create a synchronizer rooted at `paths` using the system git.
    pub fn new(paths: CachePaths, api: Arc<GitHubApi>) -> Self {
        Self {
            paths,
            api,
            vcs: Box::new(GitCli::new()),
            remote_base: DEFAULT_REMOTE_BASE.to_string(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Replace the VCS backend.
    pub fn with_vcs(mut self, vcs: impl Vcs + 'static) -> Self {
        self.vcs = Box::new(vcs);
        self
    }

    /// Base URL repositories are cloned from: `{base}/{owner}/{repo}.git`.
    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        self.remote_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the freshness window for checkouts.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Return the cache paths used by this synchronizer.
    #[cfg(test)]
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    fn remote_url(&self, key: &RepoKey) -> String {
        format!(
            "{}/{}/{}.git",
            self.remote_base,
            key.owner.as_str(),
            key.repo.as_str()
        )
    }

    /// Make sure the checkout of `reference` exists and is current.
    /// Returns the checkout directory.
    pub fn prepare(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<PathBuf, CheckoutError> {
        self.prepare_with_outcome(key, reference, token)
            .map(|prepared| prepared.path)
    }

    /// Like [`prepare`](Self::prepare), reporting what work was done.
    pub fn prepare_with_outcome(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Prepared, CheckoutError> {
        validate_git_ref(reference, "ref")?;

        let checkout_path = self.paths.checkout_dir(key, reference);

        if checkout_path.is_dir() && is_fresh(&checkout_path, self.max_age) {
            log::debug!("Reusing fresh checkout {}", checkout_path.display());
            return Ok(Prepared {
                path: checkout_path,
                commit: None,
                outcome: PrepareOutcome::Fresh,
            });
        }

        self.check_remote(key, reference, token)?;

        let auth = GitAuth::from_token(token);
        if auth.has_token() {
            log::debug!("Using GitHub credentials for {}", key);
        }

        let _lock = CheckoutLock::acquire(&self.paths.lock_path(key, reference))?;
        let (commit, outcome) = self.sync_locked(key, reference, &checkout_path, &auth)?;

        Ok(Prepared {
            path: checkout_path,
            commit: Some(commit),
            outcome,
        })
    }

    /// Ask GitHub whether the ref exists and whether we may read it.
    fn check_remote(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<(), CheckoutError> {
        let response = if is_commit_shaped(reference) {
            self.api.commit(key, reference, token)?
        } else {
            self.api.head_ref(key, reference, token)?
        };

        match response.status {
            401 => Err(CheckoutError::PrivateRepoAccess),
            404 => Err(CheckoutError::RepoNotFound),
            status if response.is_success() => {
                log::debug!("{} {} confirmed ({})", key, reference, status);
                Ok(())
            }
            status => Err(CheckoutError::UnexpectedStatus {
                status,
                url: format!("{}/{}", key, reference),
            }),
        }
    }

    /// Refresh the mirror, then write the tree if the ref moved. Caller holds
    /// the checkout lock.
    fn sync_locked(
        &self,
        key: &RepoKey,
        reference: &str,
        checkout_path: &Path,
        auth: &GitAuth,
    ) -> Result<(String, PrepareOutcome), CheckoutError> {
        let (mirror_path, commit) = self.refresh_mirror(key, reference, auth)?;
        let hash_path = self.paths.commit_hash_path(key, reference);
        let previous = read_commit_hash(&hash_path)?;

        let outcome = if checkout_path.is_dir() && previous.as_deref() == Some(commit.as_str()) {
            log::debug!("Skipping checkout to {}", checkout_path.display());
            PrepareOutcome::Unchanged
        } else {
            log::info!("Checking out {} to {}", commit, checkout_path.display());
            let index_path = self.paths.index_path(key, reference);
            if let Err(e) = self.write_tree(&mirror_path, checkout_path, &index_path, &commit) {
                // A half-written tree must not pass the freshness check.
                log::warn!("Checkout of {} failed, removing {}", commit, checkout_path.display());
                discard_logged(checkout_path);
                return Err(e);
            }
            fs::write(&hash_path, format!("{}\n", commit))?;
            PrepareOutcome::Written
        };

        touch(checkout_path)?;

        Ok((commit, outcome))
    }

    /// Clone or fetch the shared mirror and resolve `reference` in it.
    ///
    /// Every ref of a repository shares one mirror, so this runs under the
    /// mirror lock. Lock order is checkout lock, then mirror lock.
    fn refresh_mirror(
        &self,
        key: &RepoKey,
        reference: &str,
        auth: &GitAuth,
    ) -> Result<(PathBuf, String), CheckoutError> {
        let mirror_path = self.paths.mirror_dir(key);
        let _mirror_lock = CheckoutLock::acquire(&self.paths.mirror_lock_path(key))?;

        if mirror_path.exists() {
            log::info!("Fetching in {}", mirror_path.display());
            self.vcs.fetch(&mirror_path, auth)?;
            touch(&mirror_path)?;
        } else {
            self.clone_into_place(key, &mirror_path, auth)?;
        }

        let commit = self.vcs.resolve_commit(&mirror_path, reference)?;
        Ok((mirror_path, commit))
    }

    /// First clone goes to a staging dir and is renamed in, so the mirror
    /// path only ever holds a complete clone. Caller holds the mirror lock.
    fn clone_into_place(
        &self,
        key: &RepoKey,
        mirror_path: &Path,
        auth: &GitAuth,
    ) -> Result<(), CheckoutError> {
        let staging = self.paths.mirror_staging_dir(key);
        // Leftover from an interrupted clone.
        discard(&staging)?;

        log::info!("Cloning to {}", mirror_path.display());
        if let Err(e) = self.vcs.clone_mirror(&self.remote_url(key), &staging, auth) {
            discard_logged(&staging);
            return Err(e.into());
        }
        fs::rename(&staging, mirror_path)?;
        Ok(())
    }

    /// Empty `checkout_path` and check `commit` out into it.
    fn write_tree(
        &self,
        mirror_path: &Path,
        checkout_path: &Path,
        index_path: &Path,
        commit: &str,
    ) -> Result<(), CheckoutError> {
        fs::create_dir_all(checkout_path)?;
        clear_dir(checkout_path)?;
        self.vcs
            .checkout_tree(mirror_path, checkout_path, index_path, commit)?;
        Ok(())
    }
}
