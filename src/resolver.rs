//! Split a URL path into a ref and a file path.
//!
//! Branch names may contain `/`, so `a/b/c` could be branch `a` with path
//! `b/c` or branch `a/b` with path `c`. Candidates are tried shortest first
//! against the GitHub API.

use std::sync::Arc;
use thiserror::Error;

use crate::github::{CommitRecord, GitHubApi, RefRecord, is_commit_shaped};
use crate::http::HttpError;
use crate::types::RepoKey;

/// Errors returned while resolving a path.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// GitHub answered a ref lookup with a status we don't classify.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    /// The API call itself failed.
    #[error("http error: {0}")]
    Http(#[from] HttpError),
}

enum HeadLookup {
    Match,
    Continue,
    Mismatch,
}

pub struct Resolver {
    api: Arc<GitHubApi>,
}

impl Resolver {
    pub fn new(api: Arc<GitHubApi>) -> Self {
        Self { api }
    }

    /// Return `(ref, rest)` for the shortest leading segments that name a
    /// branch (or, for the first segment only, a commit). `(None, path)` when
    /// nothing matches.
    pub fn split(
        &self,
        key: &RepoKey,
        path: &str,
        token: Option<&str>,
    ) -> Result<(Option<String>, String), ResolveError> {
        if path.is_empty() {
            return Ok((None, String::new()));
        }

        let segments: Vec<&str> = path.split('/').collect();

        for end in 1..=segments.len() {
            let candidate = segments[..end].join("/");
            let rest = segments[end..].join("/");

            if end == 1 && self.is_commit(key, &candidate, token)? {
                log::debug!("{}: '{}' is a commit", key, candidate);
                return Ok((Some(candidate), rest));
            }

            match self.lookup_head(key, &candidate, token)? {
                HeadLookup::Match => {
                    log::debug!("{}: '{}' is a branch", key, candidate);
                    return Ok((Some(candidate), rest));
                }
                HeadLookup::Continue => continue,
                HeadLookup::Mismatch => return Ok((None, path.to_string())),
            }
        }

        Ok((None, path.to_string()))
    }

    fn is_commit(
        &self,
        key: &RepoKey,
        candidate: &str,
        token: Option<&str>,
    ) -> Result<bool, ResolveError> {
        if !is_commit_shaped(candidate) {
            return Ok(false);
        }

        let response = self.api.commit(key, candidate, token)?;
        if !response.is_success() {
            return Ok(false);
        }

        Ok(response
            .json::<CommitRecord>()
            .map(|commit| commit.sha.starts_with(candidate))
            .unwrap_or(false))
    }

    fn lookup_head(
        &self,
        key: &RepoKey,
        candidate: &str,
        token: Option<&str>,
    ) -> Result<HeadLookup, ResolveError> {
        let response = self.api.head_ref(key, candidate, token)?;

        if response.status == 404 {
            return Ok(HeadLookup::Continue);
        }
        if !response.is_success() {
            return Err(ResolveError::UnexpectedStatus {
                status: response.status,
                url: format!("{}/git/refs/heads/{}", key, candidate),
            });
        }

        // An array means `candidate` is a prefix of several branches.
        let Ok(record) = response.json::<RefRecord>() else {
            return Ok(HeadLookup::Continue);
        };

        if record.name == format!("refs/heads/{}", candidate) {
            Ok(HeadLookup::Match)
        } else {
            Ok(HeadLookup::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseCache;
    use crate::http::testing::FakeTransport;

    const API: &str = "https://api.test";
    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn key() -> RepoKey {
        "octocat/hello-world".parse().unwrap()
    }

    fn heads_url(candidate: &str) -> String {
        format!("{}/repos/octocat/hello-world/git/refs/heads/{}", API, candidate)
    }

    fn commit_url(candidate: &str) -> String {
        format!("{}/repos/octocat/hello-world/commits/{}", API, candidate)
    }

    fn record(name: &str) -> String {
        format!(
            r#"{{"ref": "refs/heads/{}", "object": {{"sha": "{}", "type": "commit"}}}}"#,
            name, SHA
        )
    }

    fn setup() -> (Resolver, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new());
        let cache = Arc::new(ResponseCache::new(Arc::clone(&transport)));
        let api = Arc::new(GitHubApi::new(cache, API));
        (Resolver::new(api), transport)
    }

    #[test]
    fn nested_branch_takes_shortest_exact_match() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("a/b"), 200, &record("a/b"));

        let split = resolver.split(&key(), "a/b/c", None).unwrap();

        assert_eq!(split, (Some("a/b".to_string()), "c".to_string()));
        assert_eq!(
            transport.called_urls(),
            vec![heads_url("a"), heads_url("a/b")]
        );
    }

    #[test]
    fn simple_branch() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("main"), 200, &record("main"));

        let split = resolver.split(&key(), "main/docs/index.html", None).unwrap();

        assert_eq!(
            split,
            (Some("main".to_string()), "docs/index.html".to_string())
        );
    }

    #[test]
    fn branch_with_no_rest() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("main"), 200, &record("main"));

        let split = resolver.split(&key(), "main", None).unwrap();

        assert_eq!(split, (Some("main".to_string()), String::new()));
    }

    #[test]
    fn commit_first_segment_short_circuits() {
        let (resolver, transport) = setup();
        transport.route(&commit_url(SHA), 200, &format!(r#"{{"sha": "{}"}}"#, SHA));

        let path = format!("{}/x", SHA);
        let split = resolver.split(&key(), &path, None).unwrap();

        assert_eq!(split, (Some(SHA.to_string()), "x".to_string()));
        assert_eq!(transport.called_urls(), vec![commit_url(SHA)]);
    }

    #[test]
    fn abbreviated_commit_must_prefix_returned_sha() {
        let (resolver, transport) = setup();
        transport.route(&commit_url("0123abc"), 200, &format!(r#"{{"sha": "{}"}}"#, SHA));

        let split = resolver.split(&key(), "0123abc/x", None).unwrap();

        assert_eq!(split, (None, "0123abc/x".to_string()));
    }

    #[test]
    fn hex_branch_falls_back_to_heads() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("cafe"), 200, &record("cafe"));

        let split = resolver.split(&key(), "cafe/menu.html", None).unwrap();

        assert_eq!(
            split,
            (Some("cafe".to_string()), "menu.html".to_string())
        );
        assert_eq!(
            transport.called_urls(),
            vec![commit_url("cafe"), heads_url("cafe")]
        );
    }

    #[test]
    fn ambiguous_prefix_continues() {
        let (resolver, transport) = setup();
        transport.route(
            &heads_url("release"),
            200,
            &format!("[{}, {}]", record("release/1.0"), record("release/2.0")),
        );
        transport.route(&heads_url("release/2.0"), 200, &record("release/2.0"));

        let split = resolver.split(&key(), "release/2.0/notes.md", None).unwrap();

        assert_eq!(
            split,
            (Some("release/2.0".to_string()), "notes.md".to_string())
        );
    }

    #[test]
    fn mismatched_record_gives_up() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("feat"), 200, &record("feature"));

        let split = resolver.split(&key(), "feat/x", None).unwrap();

        assert_eq!(split, (None, "feat/x".to_string()));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn no_branch_matches() {
        let (resolver, _transport) = setup();

        let split = resolver.split(&key(), "x/y", None).unwrap();

        assert_eq!(split, (None, "x/y".to_string()));
    }

    #[test]
    fn empty_path_makes_no_calls() {
        let (resolver, transport) = setup();

        let split = resolver.split(&key(), "", None).unwrap();

        assert_eq!(split, (None, String::new()));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn server_error_is_unexpected() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("main"), 500, "boom");

        let result = resolver.split(&key(), "main/x", None);

        assert!(matches!(
            result,
            Err(ResolveError::UnexpectedStatus { status: 500, .. })
        ));
    }

    #[test]
    fn repeated_split_is_served_from_cache() {
        let (resolver, transport) = setup();
        transport.route(&heads_url("main"), 200, &record("main"));

        resolver.split(&key(), "main/a", Some("tok")).unwrap();
        resolver.split(&key(), "main/b", Some("tok")).unwrap();

        assert_eq!(transport.call_count(), 1);
    }
}
