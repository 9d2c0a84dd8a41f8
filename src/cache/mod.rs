//! Mirror + checkout manager

mod checkout;
mod git;
mod lock;
mod paths;
mod staleness;

pub use checkout::{
    CheckoutError, CheckoutSync, DEFAULT_MAX_AGE, DEFAULT_REMOTE_BASE, PrepareOutcome, Prepared,
};
pub use git::{GitAuth, GitCli, GitError, Vcs, repository_exists, validate_git_ref};
pub use lock::CheckoutLock;
pub use paths::CachePaths;
pub use staleness::{is_fresh, touch};
