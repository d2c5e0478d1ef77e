//! Trigger engine: how one monitored job reacts to a pull request event.
//!
//! The engine owns no build state. For an accepted event it:
//!
//! 1. checks the job's destination repository filter,
//! 2. optionally cancels queued and interrupts running builds of the same
//!    pull request,
//! 3. reports `INPROGRESS` for the event's source commit,
//! 4. schedules a new build with the event's parameters.
//!
//! The caller then hands the returned [`ScheduledBuild`] to
//! [`TriggerEngine::supervise`], which waits for the runner's outcome and
//! reports the terminal state. Since `supervise` consumes the build, every
//! build gets at most one terminal report.

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::config::TriggerConfig;
use super::supersession::is_same_pull_request;
use crate::bitbucket::{StatusReporter, StatusUpdate};
use crate::runner::{JobRunner, ParameterSet};
use crate::types::{BuildId, BuildState, Outcome, PullRequestEvent};

/// Description given to running builds superseded by a newer event.
pub const SUPERSEDED_DESCRIPTION: &str = "Aborted build since the PR is outdated";

/// A build the engine started and has reported `INPROGRESS` for.
#[derive(Debug)]
#[must_use = "a scheduled build must be supervised to report its terminal state"]
pub struct ScheduledBuild {
    pub id: BuildId,
    pub url: String,
    event: PullRequestEvent,
    completion: oneshot::Receiver<Outcome>,
}

impl ScheduledBuild {
    pub fn event(&self) -> &PullRequestEvent {
        &self.event
    }
}

/// What the stale-build sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Superseded {
    pub cancelled: usize,
    pub interrupted: usize,
}

/// Drives one job: filter, supersede, report, schedule, report again.
#[derive(Debug)]
pub struct TriggerEngine<R, S> {
    config: TriggerConfig,
    runner: R,
    reporter: S,
}

impl<R: JobRunner, S: StatusReporter> TriggerEngine<R, S> {
    pub fn new(config: TriggerConfig, runner: R, reporter: S) -> Self {
        TriggerEngine {
            config,
            runner,
            reporter,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Handles one pull request event.
    ///
    /// Returns `None` when the event is not for this job or when scheduling
    /// failed (in which case `FAILED` has already been reported). Runner and
    /// status API failures never surface here.
    pub async fn handle(&self, event: &PullRequestEvent) -> Option<ScheduledBuild> {
        let job = &self.config.job;

        if !self.config.listens_to(&event.destination_repository) {
            debug!(
                job = %job,
                pull_request = %event.pull_request_id,
                destination = %event.destination_repository,
                expected = %self.config.destination_repository,
                "Ignoring pull request for another destination repository"
            );
            return None;
        }

        info!(
            job = %job,
            pull_request = %event.pull_request_id,
            source = %event.source_repository,
            commit = %event.source_commit.short(),
            "Handling pull request event"
        );

        if self.config.cancel_outdated_jobs {
            self.supersede(event).await;
        }

        let job_url = self.runner.job_url();
        self.report(event, BuildState::InProgress, job_url.clone()).await;

        let parameters =
            ParameterSet::from_event(event).with_defaults(&self.runner.default_parameters());

        match self.runner.schedule(event, parameters).await {
            Ok(handle) => {
                info!(
                    job = %job,
                    build = %handle.id,
                    pull_request = %event.pull_request_id,
                    url = %handle.url,
                    "Scheduled build"
                );
                Some(ScheduledBuild {
                    id: handle.id,
                    url: handle.url,
                    event: event.clone(),
                    completion: handle.completion,
                })
            }
            Err(e) => {
                error!(
                    job = %job,
                    pull_request = %event.pull_request_id,
                    error = %e,
                    "Failed to schedule build"
                );
                self.report(event, BuildState::Failed, job_url).await;
                None
            }
        }
    }

    /// Cancels queued and interrupts running builds of `event`'s pull
    /// request.
    ///
    /// Best effort: an item that finished between listing and mutation is
    /// skipped.
    pub async fn supersede(&self, event: &PullRequestEvent) -> Superseded {
        let job = &self.config.job;
        let mut superseded = Superseded::default();

        for item in self.runner.list_queued().await {
            if !is_same_pull_request(Some(item.causes.as_slice()), Some(event)) {
                continue;
            }
            match self.runner.cancel(&item).await {
                Ok(()) => {
                    info!(job = %job, build = %item.id, "Cancelled outdated queued build");
                    superseded.cancelled += 1;
                }
                Err(e) => {
                    debug!(
                        job = %job,
                        build = %item.id,
                        error = %e,
                        "Could not cancel queued build"
                    );
                }
            }
        }

        for item in self.runner.list_running().await {
            if !is_same_pull_request(Some(item.causes.as_slice()), Some(event)) {
                continue;
            }
            if let Err(e) = self
                .runner
                .set_description(&item, SUPERSEDED_DESCRIPTION)
                .await
            {
                debug!(job = %job, build = %item.id, error = %e, "Could not describe build");
            }
            match self.runner.interrupt(&item, Outcome::Aborted).await {
                Ok(()) => {
                    info!(job = %job, build = %item.id, "Interrupted outdated running build");
                    superseded.interrupted += 1;
                }
                Err(e) => {
                    debug!(
                        job = %job,
                        build = %item.id,
                        error = %e,
                        "Could not interrupt running build"
                    );
                }
            }
        }

        superseded
    }

    /// Waits for `build` to finish and reports its terminal state.
    ///
    /// A build whose completion is dropped by the runner counts as failed.
    pub async fn supervise(&self, build: ScheduledBuild) -> BuildState {
        let ScheduledBuild {
            id,
            url,
            event,
            completion,
        } = build;

        let outcome = match completion.await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(job = %self.config.job, build = %id, "Build ended without an outcome");
                Outcome::Failure
            }
        };

        let state = BuildState::from(outcome);
        info!(
            job = %self.config.job,
            build = %id,
            ?outcome,
            state = %state,
            "Build completed"
        );
        self.report(&event, state, url).await;
        state
    }

    async fn report(&self, event: &PullRequestEvent, state: BuildState, build_url: String) {
        self.reporter
            .report(StatusUpdate {
                repository: event.source_repository.clone(),
                revision: event.source_commit.clone(),
                state,
                build_url,
                description: None,
                key_extension: self.config.job.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
