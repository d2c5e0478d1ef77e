//! Derivation of bounded-length build status keys.
//!
//! The status API identifies a build status by a key of at most 40
//! characters. Keys are composed as `{ci_key}-{extension}`, where the
//! extension is usually the job name, so that several jobs can each keep their
//! own status on one commit. Compositions that would exceed the limit are
//! replaced by the hex digest of the composition, which keeps them stable and
//! distinct within budget.

use std::fmt;
use std::marker::PhantomData;

use sha1::{Digest, Sha1};

/// Maximum key length accepted by the Bitbucket status API.
pub const MAX_KEY_LEN: usize = 40;

/// Computes status keys with digest `D` (SHA-1 unless injected otherwise).
pub struct StatusKeyCodec<D = Sha1> {
    max_len: usize,
    _digest: PhantomData<fn() -> D>,
}

impl StatusKeyCodec<Sha1> {
    /// The codec used against the Bitbucket API: SHA-1, 40 characters.
    pub fn new() -> Self {
        Self::with_digest(MAX_KEY_LEN)
    }
}

impl Default for StatusKeyCodec<Sha1> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> StatusKeyCodec<D> {
    /// A codec hashing with `D` and bounding keys to `max_len` characters.
    pub fn with_digest(max_len: usize) -> Self {
        StatusKeyCodec {
            max_len,
            _digest: PhantomData,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Returns the status key for `ci_key` and `extension`.
    ///
    /// Deterministic, and never longer than [`max_len`](Self::max_len)
    /// characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use bitbucket_pr_builder::bitbucket::StatusKeyCodec;
    ///
    /// let codec = StatusKeyCodec::new();
    /// assert_eq!(codec.compute_key("jenkins", "my-job"), "jenkins-my-job");
    ///
    /// let long = codec.compute_key("jenkins", "folder/a-rather-long-pipeline-name");
    /// assert_eq!(long.len(), 40);
    /// assert!(long.chars().all(|c| c.is_ascii_hexdigit()));
    /// ```
    pub fn compute_key(&self, ci_key: &str, extension: &str) -> String {
        let key = format!("{ci_key}-{extension}");
        if key.chars().count() <= self.max_len {
            return key;
        }

        let mut digest = hex::encode(D::digest(key.as_bytes()));
        digest.truncate(self.max_len);
        digest
    }
}

impl<D> Clone for StatusKeyCodec<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for StatusKeyCodec<D> {}

impl<D> fmt::Debug for StatusKeyCodec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusKeyCodec")
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}
