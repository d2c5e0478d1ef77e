//! Extraction of the JSON document from a webhook request body.
//!
//! Bitbucket posts raw JSON, but the same endpoint also receives bodies that
//! were form-encoded by proxies or older hook configurations, with the JSON
//! under a `payload` field.

use thiserror::Error;

/// Content type of form-encoded webhook bodies.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Form field (and raw body prefix) carrying the JSON document.
const PAYLOAD_FIELD: &str = "payload";

/// Errors extracting the JSON document from a request body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The request had no body.
    #[error("empty request body")]
    Empty,

    /// The body is not valid UTF-8.
    #[error("request body is not valid UTF-8")]
    NotUtf8,

    /// A form-encoded body without a `payload` field.
    #[error("form body has no `payload` field")]
    MissingFormField,
}

/// Returns the JSON document carried by a webhook body.
///
/// - Form-encoded bodies yield the decoded `payload` field.
/// - Other bodies are returned as-is, minus a literal `payload=` prefix.
pub fn extract_payload(body: &[u8], content_type: Option<&str>) -> Result<String, PayloadError> {
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }

    let is_form = content_type
        .map(|ct| ct.trim_start().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);

    if is_form {
        return form_urlencoded::parse(body)
            .find(|(name, _)| name == PAYLOAD_FIELD)
            .map(|(_, value)| value.into_owned())
            .ok_or(PayloadError::MissingFormField);
    }

    let text = std::str::from_utf8(body).map_err(|_| PayloadError::NotUtf8)?;
    let json = text
        .strip_prefix(PAYLOAD_FIELD)
        .and_then(|rest| rest.strip_prefix('='))
        .unwrap_or(text);

    Ok(json.to_string())
}
