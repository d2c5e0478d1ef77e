//! Shared test fixtures and arbitrary generators for property-based testing.

use crate::types::{PullRequestEvent, PullRequestId, RepoFullName, Sha};
use proptest::prelude::*;

/// An event for PR `id` from `source_repository` into `org/repo`.
pub fn sample_event(id: &str, source_repository: &str) -> PullRequestEvent {
    PullRequestEvent {
        source_branch: "feature/frobnicate".to_string(),
        destination_branch: "main".to_string(),
        source_repository: RepoFullName::new(source_repository),
        source_commit: Sha::new("1a2b3c4d5e6f"),
        destination_repository: RepoFullName::new("org/repo"),
        destination_commit: Sha::new("abcdef012345"),
        pull_request_id: PullRequestId::new(id),
        title: "Add frobnicator".to_string(),
        author: "Jane Doe".to_string(),
    }
}

/// A Bitbucket `pullrequest:*` webhook body for [`sample_event`]'s PR.
pub fn sample_payload(id: u64, state: &str) -> serde_json::Value {
    serde_json::json!({
        "pullrequest": {
            "id": id,
            "title": "Add frobnicator",
            "state": state,
            "author": { "display_name": "Jane Doe", "username": "jdoe" },
            "source": {
                "branch": { "name": "feature/frobnicate" },
                "repository": { "full_name": "org/src" },
                "commit": { "hash": "1a2b3c4d5e6f" }
            },
            "destination": {
                "branch": { "name": "main" },
                "repository": { "full_name": "org/repo" },
                "commit": { "hash": "abcdef012345" }
            }
        }
    })
}

pub fn arb_repo_full_name() -> impl Strategy<Value = RepoFullName> {
    "[a-z]{1,8}/[a-z]{1,8}".prop_map(RepoFullName)
}

pub fn arb_pull_request_id() -> impl Strategy<Value = PullRequestId> {
    "[0-9]{1,4}".prop_map(PullRequestId)
}

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{12}".prop_map(Sha)
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9/-]{0,20}".prop_map(String::from)
}

pub fn arb_pull_request_event() -> impl Strategy<Value = PullRequestEvent> {
    (
        (arb_branch_name(), arb_branch_name()),
        (arb_repo_full_name(), arb_repo_full_name()),
        (arb_sha(), arb_sha()),
        arb_pull_request_id(),
        "[A-Za-z ]{0,30}",
        "[A-Za-z ]{1,20}",
    )
        .prop_map(
            |(
                (source_branch, destination_branch),
                (source_repository, destination_repository),
                (source_commit, destination_commit),
                pull_request_id,
                title,
                author,
            )| PullRequestEvent {
                source_branch,
                destination_branch,
                source_repository,
                source_commit,
                destination_repository,
                destination_commit,
                pull_request_id,
                title,
                author,
            },
        )
}
