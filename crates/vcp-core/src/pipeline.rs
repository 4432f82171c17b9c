//! Event ingestion: hash, chain, optionally sign, then append to the open
//! Merkle batch.
//!
//! Hashing is fail-closed. If an event cannot be canonicalized or signed,
//! `submit` returns an error, the chain pointer stays where it was and
//! nothing is appended. Anchoring is not on this path at all.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::chain::{HashChainState, link};
use crate::error::ErrorCode;
use crate::event::{Event, SealedEvent, Security};
use crate::hash::{HashError, HashFunction};
use crate::merkle::{LeafPosition, MerkleAccumulator};
use crate::sign::{SignError, Signer};

/// Errors from [`IntegrityPipeline::submit`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `event_type_code` disagrees with `event_type`.
    #[error("event {event_id}: type code {found} does not match {event_type}")]
    InconsistentHeader {
        event_id: String,
        event_type: String,
        found: u8,
    },

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Sign(#[from] SignError),
}

impl PipelineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InconsistentHeader { .. } => ErrorCode::InvalidValueType,
            Self::Hash(e) => e.code(),
            Self::Sign(e) => e.code(),
        }
    }
}

/// One producer stream's integrity front end.
pub struct IntegrityPipeline {
    hasher: Arc<dyn HashFunction>,
    chain: Mutex<HashChainState>,
    signer: Option<Arc<dyn Signer>>,
    accumulator: Arc<MerkleAccumulator>,
}

impl std::fmt::Debug for IntegrityPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityPipeline")
            .field("hash_algo", &self.hasher.name())
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl IntegrityPipeline {
    /// Build a pipeline over `accumulator`, hashing with its hash function.
    #[must_use]
    pub fn new(accumulator: Arc<MerkleAccumulator>, chain: HashChainState) -> Self {
        Self {
            hasher: Arc::clone(accumulator.hasher()),
            chain: Mutex::new(chain),
            signer: None,
            accumulator,
        }
    }

    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn accumulator(&self) -> &Arc<MerkleAccumulator> {
        &self.accumulator
    }

    /// Current chain state, for persistence.
    #[must_use]
    pub fn chain_state(&self) -> HashChainState {
        *self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seal one event and append it to the open batch.
    ///
    /// Submissions are serialized on the chain pointer, so leaf order within
    /// a batch always matches chain order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the event cannot be hashed or signed.
    /// The chain and the batch are untouched in that case.
    pub fn submit(&self, event: Event) -> Result<SealedEvent, PipelineError> {
        let Event { header, payload } = event;
        if !header.is_consistent() {
            return Err(PipelineError::InconsistentHeader {
                event_id: header.event_id,
                event_type: header.event_type.to_string(),
                found: header.event_type_code,
            });
        }

        let mut chain = self.chain.lock().unwrap_or_else(PoisonError::into_inner);
        let prev_hash = chain.previous_hash;
        let (event_hash, next) = link(*chain, &header, &payload, self.hasher.as_ref())?;

        let (signature, sign_algo) = match &self.signer {
            Some(signer) => (
                Some(signer.sign(&event_hash)?),
                Some(signer.algorithm().to_owned()),
            ),
            None => (None, None),
        };

        let LeafPosition { batch_id, index } = self.accumulator.append(&event_hash);
        *chain = next;
        drop(chain);

        debug!(
            event_id = %header.event_id,
            event_type = %header.event_type,
            %event_hash,
            batch_id,
            merkle_index = index,
            "event sealed"
        );

        Ok(SealedEvent {
            header,
            payload,
            security: Security {
                event_hash,
                prev_hash,
                hash_algo: self.hasher.name().to_owned(),
                signature,
                sign_algo,
                batch_id: Some(batch_id),
                merkle_index: Some(index),
            },
        })
    }
}
