//! Webhook endpoint handler.
//!
//! Accepts Bitbucket pull request notifications, decodes them once, and
//! offers the event to every configured job. Builds started by a job are
//! supervised on their own task, so the response does not wait for them.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::AppState;
use crate::types::PullRequestEvent;
use crate::webhooks::{
    ParseError, PayloadError, Rejected, SIGNATURE_HEADER, SignatureError, decode, extract_payload,
};

/// Header name for the Bitbucket event key (e.g. `pullrequest:updated`).
const HEADER_EVENT: &str = "x-event-key";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The body does not carry a JSON document.
    #[error("invalid body: {0}")]
    Payload(#[from] PayloadError),

    /// A pull request lifecycle event with unusable content.
    #[error("malformed pull request payload: {0}")]
    Malformed(#[from] ParseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Payload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Malformed(_) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `X-Event-Key`: Event type (e.g. `pullrequest:created`)
/// - Optional headers:
///   - `X-Hub-Signature`: `sha256=<hex>`, required when a secret is configured
/// - Body: JSON, raw or form-encoded under `payload`
///
/// # Response
///
/// - 200 OK: Event handled or ignored
/// - 400 Bad Request: Missing header, empty or undecodable body, malformed
///   pull request
/// - 401 Unauthorized: Invalid signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_key = get_header(&headers, HEADER_EVENT)?;

    debug!(event_key = %event_key, bytes = body.len(), "Received webhook");

    // Verify before decoding anything.
    if let Some(secret) = app_state.webhook_secret() {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = secret.verify(&body, signature) {
            warn!(event_key = %event_key, error = %e, "Rejected webhook signature");
            return Err(e.into());
        }
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let payload = extract_payload(&body, content_type)?;

    let event = match decode(&event_key, payload.as_bytes()) {
        Ok(event) => event,
        Err(Rejected::Malformed(e)) => {
            warn!(event_key = %event_key, error = %e, "Malformed pull request payload");
            return Err(WebhookError::Malformed(e));
        }
        Err(rejected) => {
            debug!(event_key = %event_key, reason = %rejected, "Ignoring webhook");
            return Ok((StatusCode::OK, "Ignored"));
        }
    };

    let started = dispatch(&app_state, &event).await;
    info!(
        event_key = %event_key,
        pull_request = %event.pull_request_id,
        destination = %event.destination_repository,
        started,
        "Webhook handled"
    );

    Ok((StatusCode::OK, "OK"))
}

/// Offers `event` to every job concurrently and spawns a supervisor per
/// started build.
///
/// Returns the number of builds started.
async fn dispatch(app_state: &AppState, event: &PullRequestEvent) -> usize {
    let event = Arc::new(event.clone());
    let mut handling = JoinSet::new();
    for job in app_state.jobs() {
        let job = Arc::clone(job);
        let event = Arc::clone(&event);
        handling.spawn(async move {
            let build = job.handle(&event).await?;
            Some((job, build))
        });
    }

    let mut started = 0;
    while let Some(joined) = handling.join_next().await {
        match joined {
            Ok(Some((job, build))) => {
                started += 1;
                tokio::spawn(async move {
                    job.supervise(build).await;
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Job handler task failed"),
        }
    }
    started
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-event-key", "pullrequest:created".parse().unwrap());

        let result = get_header(&headers, HEADER_EVENT).unwrap();
        assert_eq!(result, "pullrequest:created");
    }

    #[test]
    fn get_header_missing() {
        let headers = HeaderMap::new();

        let result = get_header(&headers, HEADER_EVENT);
        assert!(matches!(result, Err(WebhookError::MissingHeader(_))));
    }

    #[test]
    fn error_status_codes() {
        let cases = [
            (WebhookError::MissingHeader(HEADER_EVENT), StatusCode::BAD_REQUEST),
            (
                WebhookError::InvalidSignature(SignatureError::Mismatch),
                StatusCode::UNAUTHORIZED,
            ),
            (WebhookError::Payload(PayloadError::Empty), StatusCode::BAD_REQUEST),
            (
                WebhookError::Malformed(ParseError::MissingField("pullrequest.id")),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
