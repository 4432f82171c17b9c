//! Hash chain linking successive events of one stream.
//!
//! [`HashChainState`] holds the single `previous_hash` pointer. [`link`] is a
//! pure transition: it hashes an event against the current pointer and
//! returns the new state whose pointer is that event's hash. The state is
//! owned by exactly one producer stream and is never rolled back.
//!
//! Chaining is optional for a deployment. When it is disabled, every event is
//! hashed against the genesis sentinel ([`HashChainState::unchained`] never
//! advances), which keeps the hash input identical in shape.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::payload::Payload;
use crate::event::{EventHeader, SealedEvent};
use crate::hash::{Digest, GENESIS, HashError, HashFunction, HashRegistry, compute_event_hash};

/// Errors from chain verification.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Adjacent events do not link.
    #[error("hash chain broken at index {index}: expected prev_hash={expected} found={found}")]
    ChainBroken {
        /// Position of the event whose pointer is wrong.
        index: usize,
        /// Hash of the preceding event.
        expected: Digest,
        /// The pointer actually stored.
        found: Digest,
    },

    /// The first event of a stream does not start from genesis.
    #[error("stream does not start at genesis: found prev_hash={found}")]
    MissingGenesis { found: Digest },

    /// An event's own hash is invalid.
    #[error("event at index {index} failed hash verification: {source}")]
    Event {
        index: usize,
        #[source]
        source: HashError,
    },
}

impl ChainError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ChainBroken { .. } | Self::MissingGenesis { .. } => ErrorCode::ChainBroken,
            Self::Event { source, .. } => source.code(),
        }
    }
}

/// The `previous_hash` pointer of one event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChainState {
    pub previous_hash: Digest,
    /// When false the pointer stays at genesis forever.
    #[serde(default = "default_true")]
    pub chained: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for HashChainState {
    fn default() -> Self {
        Self::genesis()
    }
}

impl HashChainState {
    /// A fresh chained stream.
    #[must_use]
    pub const fn genesis() -> Self {
        Self {
            previous_hash: GENESIS,
            chained: true,
        }
    }

    /// A stream that hashes every event against genesis.
    #[must_use]
    pub const fn unchained() -> Self {
        Self {
            previous_hash: GENESIS,
            chained: false,
        }
    }

    /// Resume a chained stream after its last persisted event hash.
    #[must_use]
    pub const fn resume(previous_hash: Digest) -> Self {
        Self {
            previous_hash,
            chained: true,
        }
    }

    /// State after an event with `event_hash` has been produced.
    #[must_use]
    pub const fn advance(self, event_hash: Digest) -> Self {
        if self.chained {
            Self {
                previous_hash: event_hash,
                chained: true,
            }
        } else {
            self
        }
    }
}

/// Hash one event against `state` and return `(event_hash, new_state)`.
///
/// # Errors
///
/// Returns [`HashError::Canonical`] if the event cannot be canonicalized; the
/// state is not advanced in that case (the caller still holds the old one).
pub fn link(
    state: HashChainState,
    header: &EventHeader,
    payload: &Payload,
    algorithm: &dyn HashFunction,
) -> Result<(Digest, HashChainState), HashError> {
    let event_hash = compute_event_hash(header, payload, &state.previous_hash, algorithm)?;
    Ok((event_hash, state.advance(event_hash)))
}

/// Check that `next` claims `prev` as its predecessor.
///
/// # Errors
///
/// Returns [`ChainError::ChainBroken`] (with `index` set to `next_index`) when
/// the pointer does not match.
pub fn verify_link(
    prev: &SealedEvent,
    next: &SealedEvent,
    next_index: usize,
) -> Result<(), ChainError> {
    if next.security.prev_hash == prev.security.event_hash {
        Ok(())
    } else {
        Err(ChainError::ChainBroken {
            index: next_index,
            expected: prev.security.event_hash,
            found: next.security.prev_hash,
        })
    }
}

/// Verify an ordered stream of sealed events.
///
/// Checks, for every event, that its stored hash matches its content and that
/// it points at its predecessor. The first event must point at genesis unless
/// `from` supplies the hash it is expected to resume after.
///
/// # Errors
///
/// Returns the first [`ChainError`] found, in stream order.
pub fn verify_chain(
    events: &[SealedEvent],
    from: Option<Digest>,
    registry: &HashRegistry,
) -> Result<(), ChainError> {
    for (index, event) in events.iter().enumerate() {
        crate::hash::verify_event(event, registry)
            .map_err(|source| ChainError::Event { index, source })?;

        if index == 0 {
            match from {
                Some(expected) if event.security.prev_hash != expected => {
                    return Err(ChainError::ChainBroken {
                        index,
                        expected,
                        found: event.security.prev_hash,
                    });
                }
                None if event.security.prev_hash != GENESIS => {
                    return Err(ChainError::MissingGenesis {
                        found: event.security.prev_hash,
                    });
                }
                _ => {}
            }
        } else {
            verify_link(&events[index - 1], event, index)?;
        }
    }
    Ok(())
}

/// Verify a stream produced with chaining disabled.
///
/// Every event must verify on its own and carry the genesis sentinel as its
/// pointer.
///
/// # Errors
///
/// Returns [`ChainError::Event`] for a bad hash, or
/// [`ChainError::ChainBroken`] for a pointer other than genesis.
pub fn verify_unchained(events: &[SealedEvent], registry: &HashRegistry) -> Result<(), ChainError> {
    for (index, event) in events.iter().enumerate() {
        crate::hash::verify_event(event, registry)
            .map_err(|source| ChainError::Event { index, source })?;
        if event.security.prev_hash != GENESIS {
            return Err(ChainError::ChainBroken {
                index,
                expected: GENESIS,
                found: event.security.prev_hash,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Security;
    use crate::event::canonical::CanonicalBlob;
    use crate::event::types::EventType;
    use crate::hash::HashAlgorithm;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event(seq: i64) -> (EventHeader, Payload) {
        let at = Utc
            .timestamp_opt(1_732_000_000 + seq, 0)
            .single()
            .expect("ts");
        let header = EventHeader::new(
            format!("evt-{seq}"),
            EventType::Execution,
            at,
            "XNAS",
            "AAPL",
            "ACC-1",
        );
        let payload = Payload::Extension(
            CanonicalBlob::from_value(&json!({"fill": {"seq": seq}})).expect("blob"),
        );
        (header, payload)
    }

    fn seal_stream(n: i64, state: HashChainState) -> Vec<SealedEvent> {
        let mut state = state;
        let mut out = Vec::new();
        for seq in 0..n {
            let (header, payload) = event(seq);
            let prev = state.previous_hash;
            let (event_hash, next) =
                link(state, &header, &payload, &HashAlgorithm::Sha256).expect("link");
            state = next;
            out.push(SealedEvent {
                header,
                payload,
                security: Security {
                    event_hash,
                    prev_hash: prev,
                    hash_algo: "sha256".into(),
                    signature: None,
                    sign_algo: None,
                    batch_id: None,
                    merkle_index: None,
                },
            });
        }
        out
    }

    #[test]
    fn genesis_is_64_zeros() {
        assert_eq!(HashChainState::genesis().previous_hash.to_string(), "0".repeat(64));
    }

    #[test]
    fn link_twice_chains_first_hash() {
        let alg = HashAlgorithm::Sha256;
        let (h1, p1) = event(1);
        let (h2, p2) = event(2);
        let (hash1, state1) = link(HashChainState::genesis(), &h1, &p1, &alg).expect("1");
        assert_eq!(state1.previous_hash, hash1);
        let (hash2, state2) = link(state1, &h2, &p2, &alg).expect("2");
        assert_eq!(state2.previous_hash, hash2);
        assert_eq!(
            hash2,
            compute_event_hash(&h2, &p2, &hash1, &alg).expect("direct"),
            "second event must be hashed against the first"
        );
    }

    #[test]
    fn unchained_stream_always_uses_genesis() {
        let alg = HashAlgorithm::Blake3;
        let (h1, p1) = event(1);
        let (h2, p2) = event(2);
        let (_, s1) = link(HashChainState::unchained(), &h1, &p1, &alg).expect("1");
        assert_eq!(s1.previous_hash, GENESIS);
        let (hash2, s2) = link(s1, &h2, &p2, &alg).expect("2");
        assert_eq!(s2.previous_hash, GENESIS);
        assert_eq!(hash2, compute_event_hash(&h2, &p2, &GENESIS, &alg).expect("direct"));
    }

    #[test]
    fn verify_chain_accepts_valid_stream() {
        let events = seal_stream(5, HashChainState::genesis());
        verify_chain(&events, None, &HashRegistry::with_builtins()).expect("valid");
    }

    #[test]
    fn verify_chain_empty_is_valid() {
        verify_chain(&[], None, &HashRegistry::with_builtins()).expect("empty");
    }

    #[test]
    fn verify_chain_detects_reordering() {
        let mut events = seal_stream(4, HashChainState::genesis());
        events.swap(1, 2);
        let err = verify_chain(&events, None, &HashRegistry::with_builtins())
            .expect_err("reordered");
        assert!(matches!(err, ChainError::ChainBroken { index: 1, .. }), "{err}");
        assert_eq!(err.code(), ErrorCode::ChainBroken);
    }

    #[test]
    fn verify_chain_detects_deletion() {
        let mut events = seal_stream(4, HashChainState::genesis());
        events.remove(2);
        let err = verify_chain(&events, None, &HashRegistry::with_builtins())
            .expect_err("gap");
        assert!(matches!(err, ChainError::ChainBroken { index: 2, .. }), "{err}");
    }

    #[test]
    fn verify_chain_detects_content_tampering() {
        let mut events = seal_stream(3, HashChainState::genesis());
        events[1].header.venue_id = "XNYS".into();
        let err = verify_chain(&events, None, &HashRegistry::with_builtins())
            .expect_err("tampered");
        assert!(matches!(err, ChainError::Event { index: 1, .. }));
        assert_eq!(err.code(), ErrorCode::HashMismatch);
    }

    #[test]
    fn verify_chain_requires_genesis_or_anchor_point() {
        let events = seal_stream(4, HashChainState::genesis());
        let tail = &events[2..];
        let err = verify_chain(tail, None, &HashRegistry::with_builtins())
            .expect_err("no genesis");
        assert!(matches!(err, ChainError::MissingGenesis { .. }));
        verify_chain(
            tail,
            Some(events[1].security.event_hash),
            &HashRegistry::with_builtins(),
        )
        .expect("resumes after events[1]");
    }

    #[test]
    fn verify_unchained_stream() {
        let events = seal_stream(3, HashChainState::unchained());
        let registry = HashRegistry::with_builtins();
        verify_unchained(&events, &registry).expect("unchained stream");
        assert!(verify_chain(&events, None, &registry).is_err());

        let chained = seal_stream(3, HashChainState::genesis());
        let err = verify_unchained(&chained, &registry).expect_err("chained pointers");
        assert!(matches!(err, ChainError::ChainBroken { index: 1, .. }));
    }

    #[test]
    fn resume_continues_from_persisted_hash() {
        let events = seal_stream(2, HashChainState::genesis());
        let state = HashChainState::resume(events[1].security.event_hash);
        let (h, p) = event(2);
        let (_, next) = link(state, &h, &p, &HashAlgorithm::Sha256).expect("link");
        assert_ne!(next.previous_hash, events[1].security.event_hash);
    }
}
