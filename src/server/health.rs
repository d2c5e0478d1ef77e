//! Health check endpoint for liveness probes.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,

    /// Number of monitored jobs.
    pub jobs: usize,
}

/// Health check handler.
///
/// # Example
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"status":"ok","jobs":2}
/// ```
pub async fn health_handler(State(app_state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        jobs: app_state.jobs().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_counts_jobs() {
        let Json(health) = health_handler(State(AppState::new(Vec::new(), None))).await;
        assert_eq!(
            health,
            Health {
                status: "ok".to_string(),
                jobs: 0
            }
        );
    }
}
