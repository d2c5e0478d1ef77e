//! Newtype wrappers for domain identifiers.
//!
//! Bitbucket identifies pull requests by a repository-scoped id, repositories by
//! their `owner/slug` full name, and commits by a (possibly abbreviated) hash.
//! Keeping each in its own type stops a source repository from being passed
//! where a destination repository's commit is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pull request identifier as issued by the hosting service.
///
/// Bitbucket sends this as a JSON number, but nothing here relies on it being
/// numeric: matching is by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestId(pub String);

impl PullRequestId {
    pub fn new(s: impl Into<String>) -> Self {
        PullRequestId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<&str> for PullRequestId {
    fn from(s: &str) -> Self {
        PullRequestId(s.to_string())
    }
}

impl From<u64> for PullRequestId {
    fn from(n: u64) -> Self {
        PullRequestId(n.to_string())
    }
}

/// A repository full name, e.g. `atlassian/bitbucket-pipelines`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoFullName(pub String);

impl RepoFullName {
    pub fn new(s: impl Into<String>) -> Self {
        RepoFullName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoFullName {
    fn from(s: &str) -> Self {
        RepoFullName(s.to_string())
    }
}

/// A commit hash.
///
/// Not validated: Bitbucket webhooks carry 12-character abbreviated hashes,
/// while the status API accepts either form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(pub String);

impl Sha {
    pub fn new(s: impl Into<String>) -> Self {
        Sha(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the hash for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Sha {
    fn from(s: &str) -> Self {
        Sha(s.to_string())
    }
}

/// The name of a monitored job. Also used as the status key extension, so that
/// several jobs can report distinct statuses for the same commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(pub String);

impl JobName {
    pub fn new(s: impl Into<String>) -> Self {
        JobName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        JobName(s.to_string())
    }
}

/// A build number, unique within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub u64);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pull_request_id_from_number_is_decimal_text() {
        assert_eq!(PullRequestId::from(42), PullRequestId::new("42"));
        assert_eq!(PullRequestId::from(42).to_string(), "#42");
    }

    #[test]
    fn pull_request_id_is_not_normalised() {
        // "042" and "42" are different identifiers; no numeric coercion.
        assert_ne!(PullRequestId::new("042"), PullRequestId::new("42"));
    }

    #[test]
    fn sha_short_handles_abbreviated_input() {
        assert_eq!(Sha::new("abc").short(), "abc");
        assert_eq!(Sha::new("1a2b3c4d5e6f").short(), "1a2b3c4");
    }

    #[test]
    fn pull_request_id_deserializes_from_string() {
        let id: PullRequestId = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(id.as_str(), "17");
    }

    proptest! {
        #[test]
        fn repo_full_name_displays_verbatim(s in "[a-z0-9_-]{1,20}/[a-z0-9_.-]{1,20}") {
            prop_assert_eq!(RepoFullName::new(s.clone()).to_string(), s);
        }

        #[test]
        fn sha_short_is_prefix(s in "[0-9a-f]{7,40}") {
            let sha = Sha::new(s.clone());
            prop_assert_eq!(sha.short(), &s[..7]);
        }
    }
}
