//! Locate CI build artifacts for a ref.
//!
//! The newest commit status from the CI provider names the build; the build's
//! artifact list is then mapped onto paths relative to the artifacts directory
//! declared in the repository's build config.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::github::{Blob, CommitStatus, GitHubApi, Tree};
use crate::http::{HttpError, LONG_LIFESPAN, Response};
use crate::types::RepoKey;

pub const DEFAULT_CI_API_BASE: &str = "https://circleci.com/api/v1.1";
pub const DEFAULT_CI_CONTEXT: &str = "ci/circleci";
pub const DEFAULT_CONFIG_FILE: &str = "circle.yml";

/// Artifacts directory assumed when the build config doesn't declare one.
pub const DEFAULT_ARTIFACTS_BASE: &str = "$CIRCLE_ARTIFACTS";

/// Errors returned by [`Locator::locate`].
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The statuses endpoint returned 404.
    #[error("Missing repository")]
    NoRepository,
    /// The build is still running.
    #[error("Test in progress")]
    TestsPending,
    /// The build finished with an error or failure.
    #[error("Test failed")]
    TestsFailed,
    /// No status from the CI provider exists for this ref.
    #[error("Missing statuses for ref")]
    NoRefStatus,
    /// A request returned a status we don't classify.
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },
    /// The CI provider reported a state we don't know.
    #[error("unknown build state '{0}'")]
    UnknownState(String),
    /// A request failed outright.
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    /// A response body could not be decoded.
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },
    /// The status target URL does not name a build.
    #[error("invalid build URL '{0}'")]
    InvalidTargetUrl(String),
    /// The build config file is not valid YAML.
    #[error("invalid build config: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl ArtifactError {
    /// True when retrying later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ArtifactError::TestsPending)
    }

    fn decode(what: &str, err: impl std::fmt::Display) -> Self {
        ArtifactError::Decode {
            what: what.to_string(),
            message: err.to_string(),
        }
    }
}

/// State of a CI build as reported by its commit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Pending,
    Success,
    Error,
    Failure,
    Unknown(String),
}

impl BuildStatus {
    pub fn from_state(state: &str) -> Self {
        match state {
            "pending" => BuildStatus::Pending,
            "error" => BuildStatus::Error,
            "failure" => BuildStatus::Failure,
            "success" => BuildStatus::Success,
            other => BuildStatus::Unknown(other.to_string()),
        }
    }
}

/// CI provider settings.
#[derive(Debug, Clone)]
pub struct CiSettings {
    pub api_base: String,
    pub token: Option<String>,
    pub context: String,
    pub config_file: String,
}

impl Default for CiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_CI_API_BASE.to_string(),
            token: None,
            context: DEFAULT_CI_CONTEXT.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Artifact {
    pretty_path: String,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct BuildConfig {
    #[serde(default)]
    general: Option<GeneralSection>,
}

#[derive(Debug, Deserialize)]
struct GeneralSection {
    #[serde(default)]
    artifacts: Option<ArtifactsSetting>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactsSetting {
    One(String),
    Many(Vec<String>),
}

impl BuildConfig {
    fn artifacts_base(&self) -> Option<&str> {
        match self.general.as_ref()?.artifacts.as_ref()? {
            ArtifactsSetting::One(base) => Some(base),
            ArtifactsSetting::Many(bases) => bases.first().map(String::as_str),
        }
    }
}

/// Build id (`<owner>/<repo>/<number>`) from a status target URL.
pub fn build_identifier(target_url: &str) -> Result<String, ArtifactError> {
    let invalid = || ArtifactError::InvalidTargetUrl(target_url.to_string());
    let parsed = Url::parse(target_url).map_err(|_| invalid())?;
    let build = parsed.path().strip_prefix("/gh/").ok_or_else(invalid)?;
    let build = build.trim_end_matches('/');
    if build.is_empty() {
        return Err(invalid());
    }
    Ok(build.to_string())
}

fn components(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." if out.last().is_some_and(|last| *last != "..") => {
                out.pop();
            }
            ".." if path.starts_with('/') => {}
            other => out.push(other),
        }
    }
    out
}

/// `path` relative to `base`, both taken as POSIX paths.
///
/// Paths of different kinds (one absolute, one relative) come back normalized
/// but otherwise unchanged.
pub fn relative_path(path: &str, base: &str) -> String {
    let target = components(path);
    if path.starts_with('/') != base.starts_with('/') {
        let joined = target.join("/");
        return if path.starts_with('/') {
            format!("/{}", joined)
        } else {
            joined
        };
    }

    let start = components(base);
    let common = target
        .iter()
        .zip(start.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; start.len() - common];
    parts.extend(&target[common..]);

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn with_token(url: &str, token: Option<&str>) -> Result<String, ArtifactError> {
    let mut parsed =
        Url::parse(url).map_err(|e| ArtifactError::decode(&format!("artifact URL {}", url), e))?;
    if let Some(token) = token {
        parsed.query_pairs_mut().append_pair("circle-token", token);
    }
    Ok(parsed.into())
}

fn check_status(response: &Response, url: &str) -> Result<(), ArtifactError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ArtifactError::HttpStatus {
            status: response.status,
            url: url.to_string(),
        })
    }
}

pub struct Locator {
    api: Arc<GitHubApi>,
    settings: CiSettings,
}

impl Locator {
    pub fn new(api: Arc<GitHubApi>, settings: CiSettings) -> Self {
        let settings = CiSettings {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            ..settings
        };
        Self { api, settings }
    }

    /// Map of artifact path (relative to the artifacts base) to download URL.
    pub fn locate(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ArtifactError> {
        let status = self.latest_status(key, reference, token)?;

        match BuildStatus::from_state(&status.state) {
            BuildStatus::Pending => return Err(ArtifactError::TestsPending),
            BuildStatus::Error | BuildStatus::Failure => return Err(ArtifactError::TestsFailed),
            BuildStatus::Unknown(state) => return Err(ArtifactError::UnknownState(state)),
            BuildStatus::Success => {}
        }

        let target_url = status
            .target_url
            .as_deref()
            .ok_or_else(|| ArtifactError::InvalidTargetUrl(String::new()))?;
        let build = build_identifier(target_url)?;
        log::debug!("{} {} built by {}", key, reference, build);

        let artifacts = self.artifacts(&build)?;
        let base = self.artifacts_base(key, reference, token)?;

        let ci_token = self.settings.token.as_deref();
        let mut located = BTreeMap::new();
        for artifact in artifacts {
            let name = relative_path(&artifact.pretty_path, &base);
            located.insert(name, with_token(&artifact.url, ci_token)?);
        }

        log::info!("Found {} artifacts for {} {}", located.len(), key, reference);
        Ok(located)
    }

    fn latest_status(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<CommitStatus, ArtifactError> {
        let response = self.api.statuses(key, reference, token)?;
        if response.status == 404 {
            return Err(ArtifactError::NoRepository);
        }
        check_status(&response, &format!("{}/statuses/{}", key, reference))?;

        let statuses: Vec<CommitStatus> = response
            .json()
            .map_err(|e| ArtifactError::decode("commit statuses", e))?;

        // Newest first.
        statuses
            .into_iter()
            .find(|s| s.context == self.settings.context)
            .ok_or(ArtifactError::NoRefStatus)
    }

    fn artifacts(&self, build: &str) -> Result<Vec<Artifact>, ArtifactError> {
        let listing = format!("{}/project/github/{}/artifacts", self.settings.api_base, build);
        let mut url = Url::parse(&listing)
            .map_err(|e| ArtifactError::decode(&format!("artifact listing URL {}", listing), e))?;
        if let Some(token) = self.settings.token.as_deref() {
            url.query_pairs_mut().append_pair("circle-token", token);
        }

        let response = self.api.cache().get(url.as_str(), None, LONG_LIFESPAN)?;
        check_status(&response, &listing)?;

        response
            .json()
            .map_err(|e| ArtifactError::decode("artifact list", e))
    }

    /// Artifacts directory declared in the build config at `reference`.
    fn artifacts_base(
        &self,
        key: &RepoKey,
        reference: &str,
        token: Option<&str>,
    ) -> Result<String, ArtifactError> {
        let response = self.api.tree(key, reference, token)?;
        check_status(&response, &format!("{}/git/trees/{}", key, reference))?;
        let tree: Tree = response
            .json()
            .map_err(|e| ArtifactError::decode("tree", e))?;

        let Some(blob_url) = tree
            .tree
            .iter()
            .find(|entry| entry.path == self.settings.config_file && entry.kind == "blob")
            .and_then(|entry| entry.url.as_deref())
        else {
            log::debug!("{} has no {}", key, self.settings.config_file);
            return Ok(DEFAULT_ARTIFACTS_BASE.to_string());
        };

        let response = self.api.blob(blob_url, token)?;
        check_status(&response, blob_url)?;
        let blob: Blob = response
            .json()
            .map_err(|e| ArtifactError::decode("blob", e))?;
        let content = blob
            .decode()
            .map_err(|e| ArtifactError::decode(&self.settings.config_file, e))?;
        let content = String::from_utf8(content)
            .map_err(|e| ArtifactError::decode(&self.settings.config_file, e))?;

        if content.trim().is_empty() {
            return Ok(DEFAULT_ARTIFACTS_BASE.to_string());
        }

        let config: Option<BuildConfig> = serde_yaml::from_str(&content)?;
        Ok(config
            .as_ref()
            .and_then(BuildConfig::artifacts_base)
            .unwrap_or(DEFAULT_ARTIFACTS_BASE)
            .to_string())
    }
}
