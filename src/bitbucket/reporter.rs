//! Fire-and-forget status reporting.
//!
//! A status report must never fail or hold up the build it describes, so the
//! reporter absorbs every failure into a log line. A job without status API
//! credentials gets a disabled reporter and simply builds without reporting.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::client::{StatusClient, StatusUpdate};

/// Delivers build status updates to the hosting service.
///
/// Implementations must not propagate failures: the return type leaves no
/// room for them.
pub trait StatusReporter {
    /// Report one status update, logging and swallowing any failure.
    fn report(&self, update: StatusUpdate) -> impl Future<Output = ()> + Send;
}

/// Reporter backed by an optional [`StatusClient`].
#[derive(Debug, Clone, Default)]
pub struct BitbucketReporter {
    client: Option<Arc<StatusClient>>,
}

impl BitbucketReporter {
    pub fn new(client: StatusClient) -> Self {
        BitbucketReporter {
            client: Some(Arc::new(client)),
        }
    }

    /// A reporter that only logs that reporting is not configured.
    pub fn disabled() -> Self {
        BitbucketReporter { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}

impl StatusReporter for BitbucketReporter {
    fn report(&self, update: StatusUpdate) -> impl Future<Output = ()> + Send {
        let client = self.client.clone();
        async move {
            let Some(client) = client else {
                info!(
                    revision = %update.revision.short(),
                    state = %update.state,
                    "Will not set build status (not configured)"
                );
                return;
            };

            info!(
                repository = %update.repository,
                revision = %update.revision.short(),
                state = %update.state,
                "Setting build status"
            );

            if let Err(e) = client.post_status(&update).await {
                warn!(
                    repository = %update.repository,
                    revision = %update.revision,
                    state = %update.state,
                    status = ?e.status_code(),
                    timeout = e.is_timeout(),
                    error = %e,
                    "Failed to set build status"
                );
            }
        }
    }
}
