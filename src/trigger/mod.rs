//! Pull request build triggering.
//!
//! One [`TriggerEngine`] exists per monitored job. Ingress decodes each
//! webhook once and offers the event to every engine; each engine decides
//! for its own job whether to supersede stale builds and start a new one.
//!
//! # Key Invariants
//!
//! 1. **Exact destination filter**: an event into another repository causes
//!    no runner mutation and no status report.
//!
//! 2. **Supersede before scheduling**: with `cancel_outdated_jobs`, stale
//!    builds of the same pull request are cancelled or interrupted before
//!    the new build is queued.
//!
//! 3. **One terminal report**: `INPROGRESS` is reported once before
//!    scheduling and exactly one terminal state follows it.

pub mod config;
pub mod engine;
pub mod supersession;

pub use config::TriggerConfig;
pub use engine::{SUPERSEDED_DESCRIPTION, ScheduledBuild, Superseded, TriggerEngine};
pub use supersession::is_same_pull_request;
