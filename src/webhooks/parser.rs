//! Bitbucket pull request webhook decoder.
//!
//! Turns a raw `pullrequest:*` notification into a [`PullRequestEvent`], or
//! explains why the notification is not actionable.
//!
//! # Decoding Strategy
//!
//! 1. The body must be JSON, whatever the event key; anything else is
//!    [`Rejected::Malformed`].
//! 2. The event key (`X-Event-Key` header) must name a pull request lifecycle
//!    event: `pullrequest:created`, `pullrequest:updated`,
//!    `pullrequest:fulfilled` or `pullrequest:rejected`. Comment, approval and
//!    other non-PR keys are [`Rejected::NotLifecycleEvent`].
//! 3. Pull requests that are not open (merged, declined, superseded) are
//!    [`Rejected::NotOpen`], checked before any field validation so that a
//!    sparse payload for a closed PR is still ignored rather than refused.
//! 4. Required fields are validated explicitly; anything missing is
//!    [`Rejected::Malformed`] naming the JSON path.
//!
//! Destination repository filtering is not done here: one
//! notification is offered to every configured job, and each job filters on
//! its own configuration.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{PullRequestEvent, PullRequestId, RepoFullName, Sha};

/// Prefix shared by every pull request event key.
pub const PULL_REQUEST_EVENT_PREFIX: &str = "pullrequest:";

/// Error type for payloads that cannot be turned into an event.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not JSON of the expected shape.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A field required to build the event is absent or null.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Why a notification was not turned into an event.
#[derive(Debug, Error)]
pub enum Rejected {
    /// The event key does not describe a pull request lifecycle change.
    #[error("not a pull request lifecycle event: {0}")]
    NotLifecycleEvent(String),

    /// The pull request is closed, merged or declined.
    #[error("pull request is not open (state: {0})")]
    NotOpen(String),

    /// The payload is unusable.
    #[error("malformed payload: {0}")]
    Malformed(#[from] ParseError),
}

impl Rejected {
    /// Only malformed input is an error for the webhook sender; the other
    /// rejections are acknowledged and dropped.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Rejected::Malformed(_))
    }
}

/// The lifecycle change named by a `pullrequest:*` event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullRequestAction {
    Created,
    Updated,
    /// The PR was merged.
    Fulfilled,
    /// The PR was declined.
    Declined,
}

impl PullRequestAction {
    /// Parses an event key such as `pullrequest:updated`.
    pub fn from_event_key(key: &str) -> Option<Self> {
        match key.strip_prefix(PULL_REQUEST_EVENT_PREFIX)? {
            "created" => Some(PullRequestAction::Created),
            "updated" => Some(PullRequestAction::Updated),
            "fulfilled" => Some(PullRequestAction::Fulfilled),
            "rejected" => Some(PullRequestAction::Declined),
            _ => None,
        }
    }

    /// True for actions that close the pull request.
    pub fn closes(&self) -> bool {
        matches!(
            self,
            PullRequestAction::Fulfilled | PullRequestAction::Declined
        )
    }
}

/// Decodes a webhook notification into a pull request event.
///
/// # Arguments
///
/// * `event_key` - The value of the `X-Event-Key` header
/// * `payload` - The JSON body (already extracted from any form encoding)
///
/// # Examples
///
/// ```
/// use bitbucket_pr_builder::webhooks::{Rejected, decode};
///
/// let payload = br#"{"pullrequest": {"state": "MERGED"}}"#;
/// let result = decode("pullrequest:fulfilled", payload);
/// assert!(matches!(result, Err(Rejected::NotOpen(_))));
///
/// let result = decode("repo:push", b"{}");
/// assert!(matches!(result, Err(Rejected::NotLifecycleEvent(_))));
/// ```
pub fn decode(event_key: &str, payload: &[u8]) -> Result<PullRequestEvent, Rejected> {
    let document: serde_json::Value =
        serde_json::from_slice(payload).map_err(ParseError::from)?;

    let action = PullRequestAction::from_event_key(event_key)
        .ok_or_else(|| Rejected::NotLifecycleEvent(event_key.to_string()))?;

    let raw = RawPayload::deserialize(&document).map_err(ParseError::from)?;
    let pr = raw
        .pullrequest
        .ok_or(ParseError::MissingField("pullrequest"))?;

    match &pr.state {
        Some(state) if !state.eq_ignore_ascii_case("OPEN") => {
            return Err(Rejected::NotOpen(state.clone()));
        }
        None if action.closes() => {
            return Err(Rejected::NotOpen(event_key.to_string()));
        }
        _ => {}
    }

    Ok(build_event(pr)?)
}

// ============================================================================
// Raw payload structures
//
// Every field is optional so that absence can be reported by JSON path rather
// than as an opaque serde error.
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPayload {
    pullrequest: Option<RawPullRequest>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    id: Option<RawId>,
    title: Option<String>,
    state: Option<String>,
    author: Option<RawAuthor>,
    source: Option<RawEndpoint>,
    destination: Option<RawEndpoint>,
}

/// Bitbucket sends an integer; older payloads and hand-written tests send text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_id(self) -> PullRequestId {
        match self {
            RawId::Number(n) => PullRequestId::from(n),
            RawId::Text(s) => PullRequestId::new(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    display_name: Option<String>,
    username: Option<String>,
    nickname: Option<String>,
}

impl RawAuthor {
    /// Display name when present, falling back to the account names that
    /// older and newer payload revisions carry instead.
    fn into_name(self) -> Option<String> {
        [self.display_name, self.username, self.nickname]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    branch: Option<RawBranch>,
    repository: Option<RawRepository>,
    commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
struct RawBranch {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    hash: Option<String>,
}

/// JSON paths of one side of the pull request, for error reporting.
struct EndpointFields {
    endpoint: &'static str,
    branch: &'static str,
    repository: &'static str,
    commit: &'static str,
}

const SOURCE_FIELDS: EndpointFields = EndpointFields {
    endpoint: "pullrequest.source",
    branch: "pullrequest.source.branch.name",
    repository: "pullrequest.source.repository.full_name",
    commit: "pullrequest.source.commit.hash",
};

const DESTINATION_FIELDS: EndpointFields = EndpointFields {
    endpoint: "pullrequest.destination",
    branch: "pullrequest.destination.branch.name",
    repository: "pullrequest.destination.repository.full_name",
    commit: "pullrequest.destination.commit.hash",
};

struct Endpoint {
    branch: String,
    repository: RepoFullName,
    commit: Sha,
}

fn resolve_endpoint(
    raw: Option<RawEndpoint>,
    fields: &EndpointFields,
) -> Result<Endpoint, ParseError> {
    let raw = raw.ok_or(ParseError::MissingField(fields.endpoint))?;

    let branch = raw
        .branch
        .and_then(|b| b.name)
        .ok_or(ParseError::MissingField(fields.branch))?;
    let repository = raw
        .repository
        .and_then(|r| r.full_name)
        .ok_or(ParseError::MissingField(fields.repository))?;
    let commit = raw
        .commit
        .and_then(|c| c.hash)
        .ok_or(ParseError::MissingField(fields.commit))?;

    Ok(Endpoint {
        branch,
        repository: RepoFullName::new(repository),
        commit: Sha::new(commit),
    })
}

fn build_event(pr: RawPullRequest) -> Result<PullRequestEvent, ParseError> {
    let source = resolve_endpoint(pr.source, &SOURCE_FIELDS)?;
    let destination = resolve_endpoint(pr.destination, &DESTINATION_FIELDS)?;
    let id = pr.id.ok_or(ParseError::MissingField("pullrequest.id"))?;
    let title = pr
        .title
        .ok_or(ParseError::MissingField("pullrequest.title"))?;
    let author = pr
        .author
        .and_then(RawAuthor::into_name)
        .ok_or(ParseError::MissingField("pullrequest.author"))?;

    Ok(PullRequestEvent {
        source_branch: source.branch,
        destination_branch: destination.branch,
        source_repository: source.repository,
        source_commit: source.commit,
        destination_repository: destination.repository,
        destination_commit: destination.commit,
        pull_request_id: id.into_id(),
        title,
        author,
    })
}
