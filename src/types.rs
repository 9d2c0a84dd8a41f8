//! Repository identifiers accepted on the command line.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value cannot end with '{0}'")]
    InvalidEnd(char),
    #[error("missing separator '/' in repo key")]
    MissingSeparator,
    #[error("invalid owner: {0}")]
    InvalidOwner(#[source] Box<ParseError>),
    #[error("invalid repo: {0}")]
    InvalidRepo(#[source] Box<ParseError>),
}

/// Check `s` against GitHub's naming rules for one path segment.
///
/// These names end up in directory names and git URLs, so anything outside
/// `allowed` is refused rather than escaped.
fn check_segment(
    s: &str,
    allowed: impl Fn(char) -> bool,
    bad_start: &[char],
    bad_end: &[char],
) -> Result<(), ParseError> {
    let first = s.chars().next().ok_or(ParseError::Empty)?;
    if bad_start.contains(&first) {
        return Err(ParseError::InvalidStart(first));
    }
    if let Some(c) = s.chars().find(|c| !allowed(*c)) {
        return Err(ParseError::InvalidCharacter(c));
    }
    match s.chars().last() {
        Some(last) if bad_end.contains(&last) => Err(ParseError::InvalidEnd(last)),
        _ => Ok(()),
    }
}

/// GitHub user or organization: ASCII alphanumerics and inner hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Owner {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_segment(s, |c| c.is_ascii_alphanumeric() || c == '-', &['-'], &['-'])?;
        Ok(Owner(s.to_string()))
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository name: alphanumerics, `-`, `_` and `.`, not starting with `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo(String);

impl Repo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Repo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_segment(
            s,
            |c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'),
            &['.'],
            &[],
        )?;
        Ok(Repo(s.to_string()))
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `owner/repo`, parsed from exactly that form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub owner: Owner,
    pub repo: Repo,
}

impl FromStr for RepoKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s.split_once('/').ok_or(ParseError::MissingSeparator)?;

        Ok(RepoKey {
            owner: owner
                .parse()
                .map_err(|e| ParseError::InvalidOwner(Box::new(e)))?,
            repo: repo
                .parse()
                .map_err(|e| ParseError::InvalidRepo(Box::new(e)))?,
        })
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod owner_tests {
        use super::*;

        #[test]
        fn valid_owner_with_hyphen() {
            let owner: Owner = "code-for-america".parse().unwrap();
            assert_eq!(owner.as_str(), "code-for-america");
        }

        #[test]
        fn invalid_owner_empty() {
            assert_eq!("".parse::<Owner>(), Err(ParseError::Empty));
        }

        #[test]
        fn invalid_owner_leading_hyphen() {
            assert_eq!("-user".parse::<Owner>(), Err(ParseError::InvalidStart('-')));
        }

        #[test]
        fn invalid_owner_trailing_hyphen() {
            assert_eq!("user-".parse::<Owner>(), Err(ParseError::InvalidEnd('-')));
        }

        #[test]
        fn invalid_owner_dot() {
            assert_eq!(
                "my.org".parse::<Owner>(),
                Err(ParseError::InvalidCharacter('.'))
            );
        }
    }

    mod repo_tests {
        use super::*;

        #[test]
        fn valid_repo_complex() {
            let repo: Repo = "my-repo_v2.0".parse().unwrap();
            assert_eq!(repo.as_str(), "my-repo_v2.0");
        }

        #[test]
        fn invalid_repo_leading_dot() {
            assert_eq!(".hidden".parse::<Repo>(), Err(ParseError::InvalidStart('.')));
        }

        #[test]
        fn invalid_repo_slash() {
            assert_eq!(
                "my/repo".parse::<Repo>(),
                Err(ParseError::InvalidCharacter('/'))
            );
        }
    }

    mod repo_key_tests {
        use super::*;

        #[test]
        fn valid_repo_key() {
            let key: RepoKey = "octocat/hello-world".parse().unwrap();
            assert_eq!(key.owner.as_str(), "octocat");
            assert_eq!(key.repo.as_str(), "hello-world");
        }

        #[test]
        fn invalid_repo_key_no_slash() {
            assert_eq!(
                "octocat".parse::<RepoKey>(),
                Err(ParseError::MissingSeparator)
            );
        }

        #[test]
        fn invalid_repo_key_nested_path() {
            let result = "octocat/hello/world".parse::<RepoKey>();
            assert!(matches!(result, Err(ParseError::InvalidRepo(_))));
        }

        #[test]
        fn invalid_repo_key_empty_owner() {
            let result = "/repo".parse::<RepoKey>();
            assert!(matches!(result, Err(ParseError::InvalidOwner(_))));
        }

        #[test]
        fn repo_key_display() {
            let key: RepoKey = "octocat/hello-world".parse().unwrap();
            assert_eq!(key.to_string(), "octocat/hello-world");
        }
    }
}
