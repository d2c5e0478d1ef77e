//! Core domain types shared by ingress, the trigger engine and the runners.

pub mod build;
pub mod event;
pub mod ids;

pub use build::{BuildState, Outcome};
pub use event::{BITBUCKET_WEB_URL, PullRequestEvent};
pub use ids::{BuildId, JobName, PullRequestId, RepoFullName, Sha};
