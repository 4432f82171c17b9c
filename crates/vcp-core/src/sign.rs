//! Signing capability.
//!
//! Keys and algorithms live with the caller. The pipeline hands a [`Signer`]
//! the raw 32 bytes of each event hash and stores the returned signature
//! string in the event's security block.

use crate::error::ErrorCode;
use crate::hash::Digest;

/// Errors from a signer.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The signer could not produce a signature.
    #[error("signing with {algorithm} failed: {reason}")]
    Failed { algorithm: String, reason: String },
}

impl SignError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::SignFailure
    }
}

/// Signs event hashes.
pub trait Signer: Send + Sync {
    /// Algorithm name recorded as `sign_algo`, e.g. `"ed25519"`.
    fn algorithm(&self) -> &str;

    /// Sign the raw event-hash bytes, returning an encoded signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] when no signature can be produced. The event
    /// is then rejected rather than emitted unsigned.
    fn sign(&self, event_hash: &Digest) -> Result<String, SignError>;
}
