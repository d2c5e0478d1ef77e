//! Optional shared-secret verification of webhook deliveries.
//!
//! When a webhook secret is configured in Bitbucket, every delivery carries an
//! `X-Hub-Signature: sha256=<hex>` header holding the HMAC-SHA256 of the raw
//! body. Deliveries without a configured secret are not signed, so
//! verification only applies when the service is given a secret too.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Why a delivery's signature was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {SIGNATURE_HEADER} header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

/// The secret shared with the hosting service.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        WebhookSecret(secret.into())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size")
    }

    /// Signs `payload`, producing a header value. Used by tests and by tools
    /// replaying deliveries.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Checks a delivery's signature header against the raw body.
    ///
    /// Comparison is constant-time.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let expected = header
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or(SignatureError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn signed_payload_verifies() {
        let secret = WebhookSecret::new("s3cret");
        let header = secret.sign(b"{}");
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
        assert_eq!(secret.verify(b"{}", Some(&header)), Ok(()));
    }

    #[test]
    fn uppercase_hex_verifies() {
        let secret = WebhookSecret::new("s3cret");
        let header = secret.sign(b"body").to_uppercase().replace("SHA256=", "sha256=");
        assert_eq!(secret.verify(b"body", Some(&header)), Ok(()));
    }

    #[test]
    fn missing_header_is_refused() {
        let secret = WebhookSecret::new("s3cret");
        assert_eq!(secret.verify(b"{}", None), Err(SignatureError::Missing));
    }

    #[test]
    fn malformed_headers_are_refused() {
        let secret = WebhookSecret::new("s3cret");
        for header in ["", "abcd", "sha1=abcd", "sha256=xyz", "sha256=abc"] {
            assert_eq!(
                secret.verify(b"{}", Some(header)),
                Err(SignatureError::Malformed),
                "header {header:?}"
            );
        }
    }

    #[test]
    fn wrong_secret_is_a_mismatch() {
        let header = WebhookSecret::new("one").sign(b"{}");
        assert_eq!(
            WebhookSecret::new("two").verify(b"{}", Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let secret = WebhookSecret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    proptest! {
        #[test]
        fn tampered_payload_is_a_mismatch(
            original in prop::collection::vec(any::<u8>(), 0..128),
            tampered in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            prop_assume!(original != tampered);
            let secret = WebhookSecret::new("k");
            let header = secret.sign(&original);
            prop_assert_eq!(secret.verify(&tampered, Some(&header)), Err(SignatureError::Mismatch));
        }

        #[test]
        fn arbitrary_headers_never_panic(header in ".*") {
            let _ = WebhookSecret::new("k").verify(b"payload", Some(&header));
        }
    }
}
