//! Bitbucket build status reporting.
//!
//! This module provides:
//! - Status key derivation bounded to the API's key length limit
//! - A `reqwest` client for the commit build status endpoint (basic auth,
//!   optional proxy, fixed timeout)
//! - A fire-and-forget reporter that logs and swallows every failure

mod client;
mod error;
mod reporter;
mod status_key;

pub use client::{
    CiIdentity, ClientConfig, Credentials, DEFAULT_API_BASE, DEFAULT_TIMEOUT, ProxyConfig,
    StatusClient, StatusUpdate,
};
pub use error::StatusError;
pub use reporter::{BitbucketReporter, StatusReporter};
pub use status_key::{MAX_KEY_LEN, StatusKeyCodec};
