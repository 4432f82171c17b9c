//! Deterministic event hashing.
//!
//! The event hash input is, byte for byte:
//!
//! ```text
//! tag || canonical(header) || canonical(payload) || hex(previous_hash)
//! ```
//!
//! - `tag` is the one-byte algorithm tag of the selected [`HashFunction`].
//! - `canonical(..)` is the output of [`crate::event::canonical`].
//! - `hex(previous_hash)` is the 64 lower-case ASCII hex characters of the
//!   chain pointer. A stream with no predecessor, or one that does not chain,
//!   always uses the all-zero genesis sentinel here; the field is never
//!   omitted.
//!
//! The result is returned as a [`Digest`] whose `Display` is lower-case hex.

pub mod algorithm;
pub mod digest;

pub use algorithm::{HashAlgorithm, HashFunction, HashRegistry};
pub use digest::{DIGEST_LEN, Digest, DigestParseError};

use crate::error::ErrorCode;
use crate::event::canonical::{CanonicalError, canonicalize_serialize};
use crate::event::payload::Payload;
use crate::event::{EventHeader, SealedEvent};

/// The genesis `previous_hash`: 64 hex zeros.
pub const GENESIS: Digest = Digest::ZERO;

/// Errors from event hashing and hash verification.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The requested algorithm is not registered.
    #[error("unsupported hash algorithm: {name}")]
    UnsupportedAlgorithm { name: String },

    /// A registration reused an existing name or tag.
    #[error("hash algorithm {name} (tag 0x{tag:02x}) conflicts with a registered algorithm")]
    DuplicateAlgorithm { name: String, tag: u8 },

    /// Header or payload could not be canonicalized.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// The stored event hash does not match the recomputed hash.
    #[error("event hash mismatch: stored={stored} expected={expected}")]
    HashMismatch { stored: Digest, expected: Digest },
}

impl HashError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedAlgorithm { .. } | Self::DuplicateAlgorithm { .. } => {
                ErrorCode::UnsupportedAlgorithm
            }
            Self::Canonical(e) => e.code(),
            Self::HashMismatch { .. } => ErrorCode::HashMismatch,
        }
    }
}

/// Hash pre-canonicalized header and payload bytes.
///
/// This is the primitive every other entry point reduces to. It has no side
/// effects and is safe to call concurrently.
#[must_use]
pub fn hash_canonical_parts(
    header: &[u8],
    payload: &[u8],
    previous_hash: &Digest,
    algorithm: &dyn HashFunction,
) -> Digest {
    let tag = [algorithm.tag()];
    let prev_hex = previous_hash.to_hex();
    algorithm.digest_parts(&[&tag[..], header, payload, prev_hex.as_bytes()])
}

/// Compute the content hash of one event.
///
/// # Errors
///
/// Returns [`HashError::Canonical`] if header or payload contain a value with
/// no canonical form.
pub fn compute_event_hash(
    header: &EventHeader,
    payload: &Payload,
    previous_hash: &Digest,
    algorithm: &dyn HashFunction,
) -> Result<Digest, HashError> {
    let header_bytes = canonicalize_serialize(header)?;
    let payload_bytes = payload.canonical_bytes()?;
    Ok(hash_canonical_parts(
        &header_bytes,
        &payload_bytes,
        previous_hash,
        algorithm,
    ))
}

/// Recompute a sealed event's hash with the algorithm named in its security
/// block and compare it to the stored value.
///
/// # Errors
///
/// Returns [`HashError::UnsupportedAlgorithm`] if the algorithm is not in
/// `registry`, [`HashError::HashMismatch`] if the content was altered, or
/// [`HashError::Canonical`] if it cannot be canonicalized.
pub fn verify_event(event: &SealedEvent, registry: &HashRegistry) -> Result<(), HashError> {
    let algorithm = registry.resolve(&event.security.hash_algo)?;
    let expected = compute_event_hash(
        &event.header,
        &event.payload,
        &event.security.prev_hash,
        algorithm.as_ref(),
    )?;
    if expected == event.security.event_hash {
        Ok(())
    } else {
        Err(HashError::HashMismatch {
            stored: event.security.event_hash,
            expected,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
