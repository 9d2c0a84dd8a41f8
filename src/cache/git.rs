//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for operations that touch the network or a work tree:**
//! - `clone_mirror` - full `--mirror` clone of the remote
//! - `fetch` - refresh every ref of an existing mirror
//! - `checkout_tree` - write one ref's tree into an arbitrary directory
//!
//! **libgit2 for read operations:**
//! - `resolve_commit` - ref to commit SHA against the local mirror
//! - `open_repository` / `repository_exists`
//!
//! Credentials never enter the process environment. A [`GitAuth`] is passed
//! explicitly and applied only to the environment of the child it configures.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use git2::Repository;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// The ref does not resolve to a commit in the mirror.
    #[error("ref '{0}' not found in mirror")]
    RefNotFound(String),
    /// Output parsing or unexpected git data.
    #[error("failed to parse git data: {0}")]
    ParseError(String),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Fetch failed.
    #[error("fetch failed: {0}")]
    FetchError(String),
    /// Writing the work tree failed.
    #[error("checkout failed: {0}")]
    CheckoutError(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a git ref (branch name or commit SHA) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
pub fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b == 0 || b < 0x20) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

/// Credentials for one locked git sequence.
///
/// Built per `prepare` call and dropped when it returns. Applying it to a
/// command always scrubs inherited askpass/credential variables first, so an
/// anonymous call never sees a token from anywhere else.
#[derive(Clone, Default)]
pub struct GitAuth {
    token: Option<String>,
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

const SCRUBBED_VARS: [&str; 7] = [
    "GIT_ASKPASS",
    "SSH_ASKPASS",
    "GIT_USERNAME",
    "GIT_PASSWORD",
    "GIT_CONFIG_COUNT",
    "GIT_CONFIG_KEY_0",
    "GIT_CONFIG_VALUE_0",
];

impl GitAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An empty token is treated as no token.
    pub fn from_token(token: Option<&str>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn apply(&self, cmd: &mut Command) {
        for var in SCRUBBED_VARS {
            cmd.env_remove(var);
        }

        if let Some(token) = &self.token {
            let basic = STANDARD.encode(format!("x-access-token:{}", token));
            cmd.env("GIT_CONFIG_COUNT", "1");
            cmd.env("GIT_CONFIG_KEY_0", "http.extraHeader");
            cmd.env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {}", basic));
        }
    }
}

/// The local VCS capability the checkout synchronizer drives.
pub trait Vcs: Send + Sync {
    /// Full mirror clone of `url` into `dest`, which must not exist yet.
    /// A failed clone may leave `dest` behind for the caller to discard.
    fn clone_mirror(&self, url: &str, dest: &Path, auth: &GitAuth) -> Result<(), GitError>;

    /// Update every ref of an existing mirror from its origin.
    fn fetch(&self, mirror: &Path, auth: &GitAuth) -> Result<(), GitError>;

    /// Commit SHA that `reference` points at in the local mirror.
    fn resolve_commit(&self, mirror: &Path, reference: &str) -> Result<String, GitError>;

    /// Write the tree of `reference` into `work_tree`, staging through
    /// `index_file` so the mirror itself is only read.
    fn checkout_tree(
        &self,
        mirror: &Path,
        work_tree: &Path,
        index_file: &Path,
        reference: &str,
    ) -> Result<(), GitError>;
}

/// Git CLI wrapper with security hardening.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::ParseError(format!("{} path is not valid UTF-8", what)))
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    /// - the credentials in `auth`, and nothing inherited
    pub(crate) fn command(&self, auth: &GitAuth) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        auth.apply(&mut cmd);
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl Vcs for GitCli {
    fn clone_mirror(&self, url: &str, dest: &Path, auth: &GitAuth) -> Result<(), GitError> {
        if url.starts_with('-') {
            return Err(GitError::InvalidInput("url cannot start with '-'".to_string()));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let dest_str = path_str(dest, "destination")?;

        let output = self
            .command(auth)
            .args(["clone", "--mirror", "--"])
            .arg(url)
            .arg(dest_str)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CloneError(stderr.into_owned()));
        }

        Ok(())
    }

    fn fetch(&self, mirror: &Path, auth: &GitAuth) -> Result<(), GitError> {
        let mirror_str = path_str(mirror, "mirror")?;

        let output = self
            .command(auth)
            .arg("-C")
            .arg(mirror_str)
            .args(["fetch", "--prune", "origin"])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::FetchError(stderr.into_owned()));
        }

        Ok(())
    }

    fn resolve_commit(&self, mirror: &Path, reference: &str) -> Result<String, GitError> {
        validate_git_ref(reference, "ref")?;

        let repo = open_repository(mirror)?;
        let object = repo.revparse_single(reference).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RefNotFound(reference.to_string())
            } else {
                GitError::Git(e)
            }
        })?;
        let commit = object.peel_to_commit()?;

        Ok(commit.id().to_string())
    }

    fn checkout_tree(
        &self,
        mirror: &Path,
        work_tree: &Path,
        index_file: &Path,
        reference: &str,
    ) -> Result<(), GitError> {
        validate_git_ref(reference, "ref")?;

        std::fs::create_dir_all(work_tree)?;
        match std::fs::remove_file(index_file) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let output = self
            .checkout_command(mirror, work_tree, index_file, reference)?
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CheckoutError(stderr.into_owned()));
        }

        Ok(())
    }
}

impl GitCli {
    /// `git checkout <ref> -- .` from a bare mirror into a separate work tree.
    ///
    /// `GIT_INDEX_FILE` points at a per-checkout index; without it git would
    /// write the mirror's shared `index` and concurrent checkouts would collide
    /// on `index.lock`.
    fn checkout_command(
        &self,
        mirror: &Path,
        work_tree: &Path,
        index_file: &Path,
        reference: &str,
    ) -> Result<Command, GitError> {
        let mirror = mirror.canonicalize()?;
        let work_tree = work_tree.canonicalize()?;
        let index_file = match (index_file.parent(), index_file.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                parent.canonicalize()?.join(name)
            }
            _ => index_file.to_path_buf(),
        };

        let git_dir = format!("--git-dir={}", path_str(&mirror, "mirror")?);
        let work_tree_arg = format!("--work-tree={}", path_str(&work_tree, "work tree")?);

        // Checkout is local; nothing here needs credentials.
        let mut cmd = self.command(&GitAuth::anonymous());
        cmd.env("GIT_INDEX_FILE", &index_file)
            .current_dir(&work_tree)
            .arg(git_dir)
            .arg(work_tree_arg)
            .args(["checkout", "--force"])
            .arg(reference)
            .args(["--", "."]);
        Ok(cmd)
    }
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Check if a path contains a valid git repository.
pub fn repository_exists(path: &Path) -> bool {
    Repository::open(path).is_ok()
}
