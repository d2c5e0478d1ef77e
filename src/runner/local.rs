//! In-process job runner.
//!
//! Each build runs the job's command through `sh -c` with the build's
//! parameters in its environment. A semaphore bounds the number of builds
//! running at once; builds beyond that wait in the queue. Every build owns a
//! cancellation token, which both removes a queued build and kills a running
//! one.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Semaphore, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BuildHandle, Cause, JobRunner, ParameterSet, WorkItem, WorkStatus};
use crate::types::{BuildId, JobName, Outcome, PullRequestEvent};

/// Errors from queue and executor mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    /// The build already finished (or never existed).
    #[error("build {0} not found")]
    NotFound(BuildId),

    /// Only queued builds can be cancelled.
    #[error("build {0} is not queued")]
    NotQueued(BuildId),

    /// Only running builds can be interrupted.
    #[error("build {0} is not running")]
    NotRunning(BuildId),
}

/// How one job's builds are run.
#[derive(Debug, Clone)]
pub struct LocalRunnerConfig {
    pub job: JobName,

    /// Link to the job; build links are `{job_url}{number}/`.
    pub job_url: String,

    /// Shell command run for every build.
    pub command: String,

    pub workdir: Option<PathBuf>,

    /// Executor count. Zero is treated as one.
    pub max_concurrent_builds: usize,

    pub default_parameters: ParameterSet,
}

/// Runs builds as local processes. Cheap to clone.
#[derive(Clone)]
pub struct LocalRunner {
    inner: Arc<Inner>,
}

struct Inner {
    config: LocalRunnerConfig,
    next_id: AtomicU64,
    builds: Mutex<BTreeMap<BuildId, BuildEntry>>,
    executors: Arc<Semaphore>,
}

struct BuildEntry {
    causes: Vec<Cause>,
    status: WorkStatus,
    description: Option<String>,
    cancel: CancellationToken,
    /// Outcome to complete with once the token fires.
    requested: Option<Outcome>,
}

impl LocalRunner {
    pub fn new(mut config: LocalRunnerConfig) -> Self {
        if !config.job_url.ends_with('/') {
            config.job_url.push('/');
        }
        let executors = Arc::new(Semaphore::new(config.max_concurrent_builds.max(1)));

        LocalRunner {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicU64::new(1),
                builds: Mutex::new(BTreeMap::new()),
                executors,
            }),
        }
    }

    pub fn job(&self) -> &JobName {
        &self.inner.config.job
    }

    pub fn build_url(&self, id: BuildId) -> String {
        format!("{}{}/", self.inner.config.job_url, id.0)
    }
}

impl Inner {
    fn builds(&self) -> MutexGuard<'_, BTreeMap<BuildId, BuildEntry>> {
        self.builds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, status: WorkStatus) -> Vec<WorkItem> {
        self.builds()
            .iter()
            .filter(|(_, entry)| entry.status == status)
            .map(|(id, entry)| WorkItem {
                id: *id,
                causes: entry.causes.clone(),
                status: entry.status,
                description: entry.description.clone(),
            })
            .collect()
    }

    /// Fires the build's token if it is in `expected` status.
    fn stop(&self, id: BuildId, expected: WorkStatus, outcome: Outcome) -> Result<(), RunnerError> {
        let mut builds = self.builds();
        let entry = builds.get_mut(&id).ok_or(RunnerError::NotFound(id))?;
        if entry.status != expected {
            return Err(match expected {
                WorkStatus::Queued => RunnerError::NotQueued(id),
                WorkStatus::Running => RunnerError::NotRunning(id),
            });
        }
        entry.requested.get_or_insert(outcome);
        entry.cancel.cancel();
        Ok(())
    }

    /// Moves a queued build onto an executor, unless it was cancelled.
    fn mark_running(&self, id: BuildId) -> bool {
        match self.builds().get_mut(&id) {
            Some(entry) if !entry.cancel.is_cancelled() => {
                entry.status = WorkStatus::Running;
                true
            }
            _ => false,
        }
    }

    fn requested_outcome(&self, id: BuildId) -> Outcome {
        self.builds()
            .get(&id)
            .and_then(|entry| entry.requested)
            .unwrap_or(Outcome::Aborted)
    }

    async fn execute(
        &self,
        id: BuildId,
        cancel: &CancellationToken,
        environment: BTreeMap<String, String>,
    ) -> Outcome {
        let job = &self.config.job;

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(job = %job, build = %id, "Queued build cancelled");
                return self.requested_outcome(id);
            }
            permit = self.executors.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Outcome::NotBuilt,
            },
        };

        if !self.mark_running(id) {
            info!(job = %job, build = %id, "Queued build cancelled");
            return self.requested_outcome(id);
        }

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.config.command)
            .envs(environment)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(workdir) = &self.config.workdir {
            command.current_dir(workdir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job = %job, build = %id, error = %e, "Failed to start build");
                return Outcome::Failure;
            }
        };
        info!(job = %job, build = %id, pid = ?child.id(), "Build started");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(job = %job, build = %id, error = %e, "Failed to kill build process");
                }
                let outcome = self.requested_outcome(id);
                info!(job = %job, build = %id, ?outcome, "Build interrupted");
                outcome
            }
            status = child.wait() => match status {
                Ok(status) if status.success() => Outcome::Success,
                Ok(status) => {
                    debug!(job = %job, build = %id, code = ?status.code(), "Build command failed");
                    Outcome::Failure
                }
                Err(e) => {
                    warn!(job = %job, build = %id, error = %e, "Failed to wait for build");
                    Outcome::Failure
                }
            },
        }
    }
}

async fn run_build(
    inner: Arc<Inner>,
    id: BuildId,
    cancel: CancellationToken,
    environment: BTreeMap<String, String>,
    completion: oneshot::Sender<Outcome>,
) {
    let outcome = inner.execute(id, &cancel, environment).await;
    inner.builds().remove(&id);

    info!(job = %inner.config.job, build = %id, ?outcome, "Build finished");
    // Nobody may be waiting any more; the outcome is logged either way.
    let _ = completion.send(outcome);
}

impl JobRunner for LocalRunner {
    type Error = RunnerError;

    fn job_url(&self) -> String {
        self.inner.config.job_url.clone()
    }

    fn default_parameters(&self) -> ParameterSet {
        self.inner.config.default_parameters.clone()
    }

    fn list_queued(&self) -> impl Future<Output = Vec<WorkItem>> + Send {
        let items = self.inner.snapshot(WorkStatus::Queued);
        async move { items }
    }

    fn list_running(&self) -> impl Future<Output = Vec<WorkItem>> + Send {
        let items = self.inner.snapshot(WorkStatus::Running);
        async move { items }
    }

    fn cancel(&self, item: &WorkItem) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let result = self
            .inner
            .stop(item.id, WorkStatus::Queued, Outcome::Aborted);
        async move { result }
    }

    fn set_description(
        &self,
        item: &WorkItem,
        description: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let result = match self.inner.builds().get_mut(&item.id) {
            Some(entry) => {
                entry.description = Some(description.to_string());
                Ok(())
            }
            None => Err(RunnerError::NotFound(item.id)),
        };
        async move { result }
    }

    fn interrupt(
        &self,
        item: &WorkItem,
        outcome: Outcome,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let result = self.inner.stop(item.id, WorkStatus::Running, outcome);
        async move { result }
    }

    fn schedule(
        &self,
        event: &PullRequestEvent,
        parameters: ParameterSet,
    ) -> impl Future<Output = Result<BuildHandle, Self::Error>> + Send {
        let inner = self.inner.clone();
        let id = BuildId(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let url = self.build_url(id);
        let cancel = CancellationToken::new();

        inner.builds().insert(
            id,
            BuildEntry {
                causes: vec![Cause::PullRequest(event.clone())],
                status: WorkStatus::Queued,
                description: Some(event.build_description()),
                cancel: cancel.clone(),
                requested: None,
            },
        );
        info!(
            job = %inner.config.job,
            build = %id,
            pull_request = %event.pull_request_id,
            "Build queued"
        );

        let environment = parameters.environment();
        async move {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(run_build(inner, id, cancel, environment, tx));
            Ok(BuildHandle {
                id,
                url,
                completion: rx,
            })
        }
    }
}
