//! Webhook ingress: body extraction, signature verification and decoding of
//! Bitbucket pull request notifications.

pub mod parser;
pub mod payload;
pub mod signature;

pub use parser::{
    PULL_REQUEST_EVENT_PREFIX, ParseError, PullRequestAction, Rejected, decode,
};
pub use payload::{PayloadError, extract_payload};
pub use signature::{SIGNATURE_HEADER, SignatureError, WebhookSecret};
