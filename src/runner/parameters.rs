//! Build parameters and their environment export.
//!
//! Every PR build carries the nine `bbprb*` parameters describing the pull
//! request. They are merged over the job's default parameters (the PR value
//! wins on a name clash) and exported to the build's environment together
//! with a handful of shorter aliases.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::PullRequestEvent;

pub const DESTINATION_BRANCH: &str = "bbprbDestinationBranch";
pub const DESTINATION_COMMIT_HASH: &str = "bbprbDestinationCommitHash";
pub const DESTINATION_REPOSITORY: &str = "bbprbDestinationRepository";
pub const PULL_REQUEST_AUTHOR: &str = "bbprbPullRequestAuthor";
pub const PULL_REQUEST_ID: &str = "bbprbPullRequestId";
pub const PULL_REQUEST_TITLE: &str = "bbprbPullRequestTitle";
pub const SOURCE_BRANCH: &str = "bbprbSourceBranch";
pub const SOURCE_COMMIT_HASH: &str = "bbprbSourceCommitHash";
pub const SOURCE_REPOSITORY: &str = "bbprbSourceRepository";

/// Environment aliases and the parameter each one mirrors.
const ENVIRONMENT_ALIASES: [(&str, &str); 7] = [
    ("destinationRepository", DESTINATION_REPOSITORY),
    ("pullRequestAuthor", PULL_REQUEST_AUTHOR),
    ("pullRequestId", PULL_REQUEST_ID),
    ("pullRequestTitle", PULL_REQUEST_TITLE),
    ("sourceBranch", SOURCE_BRANCH),
    ("sourceRepository", SOURCE_REPOSITORY),
    ("targetBranch", DESTINATION_BRANCH),
];

/// Named string parameters of one build, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet(BTreeMap::new())
    }

    /// The `bbprb*` parameters describing `event`.
    pub fn from_event(event: &PullRequestEvent) -> Self {
        let mut params = ParameterSet::new();
        params.insert(DESTINATION_BRANCH, &event.destination_branch);
        params.insert(DESTINATION_COMMIT_HASH, event.destination_commit.as_str());
        params.insert(DESTINATION_REPOSITORY, event.destination_repository.as_str());
        params.insert(PULL_REQUEST_AUTHOR, &event.author);
        params.insert(PULL_REQUEST_ID, event.pull_request_id.as_str());
        params.insert(PULL_REQUEST_TITLE, &event.title);
        params.insert(SOURCE_BRANCH, &event.source_branch);
        params.insert(SOURCE_COMMIT_HASH, event.source_commit.as_str());
        params.insert(SOURCE_REPOSITORY, event.source_repository.as_str());
        params
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fills in every default not already present.
    pub fn with_defaults(mut self, defaults: &ParameterSet) -> Self {
        for (name, value) in defaults.iter() {
            self.0
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
        self
    }

    /// True when the set describes a pull request.
    pub fn is_pull_request(&self) -> bool {
        self.0.contains_key(PULL_REQUEST_ID)
    }

    /// Variables to export to the build's environment.
    ///
    /// Contains every parameter, plus the short aliases for pull request
    /// builds. Absent PR fields export as the empty string.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = self.0.clone();
        if self.is_pull_request() {
            for (alias, source) in ENVIRONMENT_ALIASES {
                env.insert(
                    alias.to_string(),
                    self.get(source).unwrap_or_default().to_string(),
                );
            }
        }
        env
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParameterSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
