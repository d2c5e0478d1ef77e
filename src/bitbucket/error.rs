//! Status API error types.
//!
//! None of these reach the build: the reporter logs and drops them. They exist
//! so that the log line says which of the failure modes happened.

use reqwest::StatusCode;
use thiserror::Error;

/// A failure talking to the build status API.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The configured proxy is unusable.
    #[error("invalid proxy {host}:{port}: {source}")]
    Proxy {
        host: String,
        port: u16,
        #[source]
        source: reqwest::Error,
    },

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("status API answered {status} for {url}")]
    Rejected {
        status: StatusCode,
        url: String,
        body: String,
    },
}

impl StatusError {
    /// True when the request was cut off by the client timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            StatusError::Transport { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// The HTTP status, if the API answered at all.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            StatusError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_names_status_and_url() {
        let err = StatusError::Rejected {
            status: StatusCode::UNAUTHORIZED,
            url: "https://example.invalid/x".to_string(),
            body: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "status API answered 401 Unauthorized for https://example.invalid/x"
        );
        assert_eq!(err.status_code(), Some(StatusCode::UNAUTHORIZED));
        assert!(!err.is_timeout());
    }
}
