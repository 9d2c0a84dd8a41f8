//! Read-only GitHub REST API client.
//!
//! Every call goes through the shared [`ResponseCache`]. Responses are handed
//! back as-is so callers can classify statuses themselves; the payload types
//! below cover only the fields refmirror reads.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::http::{DEFAULT_LIFESPAN, HttpError, LONG_LIFESPAN, Response, ResponseCache};
use crate::types::RepoKey;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A single entry from `git/refs/heads/<name>`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefRecord {
    #[serde(rename = "ref")]
    pub name: String,
}

/// The subset of `commits/<sha>` we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub tree: Vec<TreeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Blob {
    pub content: String,
    pub encoding: String,
}

impl Blob {
    /// Raw blob bytes. GitHub wraps base64 content at 60 columns.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.encoding != "base64" {
            return Ok(self.content.clone().into_bytes());
        }
        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    }
}

/// One entry of `statuses/<ref>`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitStatus {
    pub state: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub target_url: Option<String>,
}

/// True if `candidate` looks like a full or abbreviated commit SHA.
pub fn is_commit_shaped(candidate: &str) -> bool {
    (4..=40).contains(&candidate.len()) && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

/// Thin wrapper that builds GitHub URLs and fetches them through the cache.
pub struct GitHubApi {
    cache: Arc<ResponseCache>,
    api_base: String,
}

impl GitHubApi {
    pub fn new(cache: Arc<ResponseCache>, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self { cache, api_base }
    }

    /// The shared cache, for callers fetching non-GitHub URLs.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn repo_url(&self, key: &RepoKey, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            key.owner.as_str(),
            key.repo.as_str(),
            suffix
        )
    }

    fn fetch(
        &self,
        url: &str,
        token: Option<&str>,
        lifespan: Duration,
    ) -> Result<Arc<Response>, HttpError> {
        self.cache.get(url, token, lifespan)
    }

    /// `git/refs/heads/<branch>`: a single record on an exact match, an array
    /// when `branch` is a prefix of several heads, 404 otherwise.
    pub fn head_ref(
        &self,
        key: &RepoKey,
        branch: &str,
        token: Option<&str>,
    ) -> Result<Arc<Response>, HttpError> {
        let url = self.repo_url(key, &format!("git/refs/heads/{}", branch));
        self.fetch(&url, token, DEFAULT_LIFESPAN)
    }

    /// `commits/<reference>`.
    pub fn commit(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Arc<Response>, HttpError> {
        let url = self.repo_url(key, &format!("commits/{}", reference));
        self.fetch(&url, token, DEFAULT_LIFESPAN)
    }

    /// `git/trees/<reference>`, long-cached by the ref string.
    ///
    /// A branch tree can move under this cache; that staleness is accepted.
    pub fn tree(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Arc<Response>, HttpError> {
        let url = self.repo_url(key, &format!("git/trees/{}", reference));
        self.fetch(&url, token, LONG_LIFESPAN)
    }

    /// A blob by its API URL, as listed in a tree entry. Blobs are immutable.
    pub fn blob(&self, url: &str, token: Option<&str>) -> Result<Arc<Response>, HttpError> {
        self.fetch(url, token, LONG_LIFESPAN)
    }

    /// `statuses/<reference>`, newest first.
    pub fn statuses(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Arc<Response>, HttpError> {
        let url = self.repo_url(key, &format!("statuses/{}", reference));
        self.fetch(&url, token, DEFAULT_LIFESPAN)
    }
}
