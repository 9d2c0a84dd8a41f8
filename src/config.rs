//! Runtime settings shared by every command.

use std::path::PathBuf;
use std::time::Duration;

use crate::artifacts::CiSettings;
use crate::cache::{CachePaths, DEFAULT_MAX_AGE, DEFAULT_REMOTE_BASE};
use crate::github::DEFAULT_API_BASE;
use crate::http::DEFAULT_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Config {
    /// Cache root holding `repos/` and `checkouts/`.
    pub root: PathBuf,
    pub api_base: String,
    /// Base URL mirrors are cloned from.
    pub remote_base: String,
    pub github_token: Option<String>,
    pub timeout: Duration,
    /// Freshness window for checkouts.
    pub max_age: Duration,
    pub ci: CiSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: CachePaths::default().root().to_path_buf(),
            api_base: DEFAULT_API_BASE.to_string(),
            remote_base: DEFAULT_REMOTE_BASE.to_string(),
            github_token: None,
            timeout: DEFAULT_TIMEOUT,
            max_age: DEFAULT_MAX_AGE,
            ci: CiSettings::default(),
        }
    }
}

impl Config {
    /// GitHub token, with an empty value treated as absent.
    pub fn token(&self) -> Option<&str> {
        self.github_token.as_deref().filter(|t| !t.is_empty())
    }
}
