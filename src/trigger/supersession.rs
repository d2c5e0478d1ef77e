//! "Same pull request" matching for superseding outdated builds.
//!
//! A pull request is identified by its id together with its source
//! repository. Title, author, branches and commit hashes are not part of the
//! identity: they change between the event that started an old build and the
//! event that supersedes it.

use crate::runner::Cause;
use crate::types::PullRequestEvent;

/// True if any of `causes` was a pull request event for the same pull
/// request as `candidate`.
///
/// Total: an absent cause list or candidate never matches.
pub fn is_same_pull_request(
    causes: Option<&[Cause]>,
    candidate: Option<&PullRequestEvent>,
) -> bool {
    let (Some(causes), Some(candidate)) = (causes, candidate) else {
        return false;
    };

    causes
        .iter()
        .filter_map(Cause::pull_request)
        .any(|existing| {
            existing.pull_request_id == candidate.pull_request_id
                && existing.source_repository == candidate.source_repository
        })
}
