//! HTTP server for the pull request builder.
//!
//! # Endpoints
//!
//! - `POST /bbprb-hook` (and `/bbprb-hook/`) - Accepts Bitbucket webhook
//!   deliveries
//! - `GET /health` - Returns 200 with the number of monitored jobs

use std::sync::Arc;

use tower_http::trace::TraceLayer;

pub mod health;
pub mod webhook;

pub use health::{Health, health_handler};
pub use webhook::{WebhookError, webhook_handler};

use crate::bitbucket::BitbucketReporter;
use crate::runner::LocalRunner;
use crate::trigger::TriggerEngine;
use crate::webhooks::WebhookSecret;

/// Path Bitbucket delivers webhooks to.
pub const WEBHOOK_PATH: &str = "/bbprb-hook";

/// The trigger engine of one configured job.
pub type JobTrigger = TriggerEngine<LocalRunner, BitbucketReporter>;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    jobs: Vec<Arc<JobTrigger>>,

    /// Verifies `X-Hub-Signature` when set.
    webhook_secret: Option<WebhookSecret>,
}

impl AppState {
    pub fn new(jobs: Vec<JobTrigger>, webhook_secret: Option<WebhookSecret>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                jobs: jobs.into_iter().map(Arc::new).collect(),
                webhook_secret,
            }),
        }
    }

    pub fn jobs(&self) -> &[Arc<JobTrigger>] {
        &self.inner.jobs
    }

    pub fn webhook_secret(&self) -> Option<&WebhookSecret> {
        self.inner.webhook_secret.as_ref()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler))
        .route("/bbprb-hook/", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
