//! vcp-core: tamper-evident audit trails for trading events.
//!
//! Events are canonicalized and hashed ([`hash`]), optionally linked into a
//! chain ([`chain`]), batched into Merkle trees ([`merkle`]) and the batch
//! roots are committed to external anchors ([`anchor`]). [`pipeline`] wires
//! the ingestion half together; [`anchor::scheduler`] drives the rest.
//!
//! # Conventions
//!
//! - **Errors**: one `thiserror` enum per module, each with `code()` mapping
//!   to a stable [`error::ErrorCode`]. `anyhow` only in [`config`].
//! - **Logging**: `tracing` macros. Nothing here installs a subscriber.

pub mod anchor;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod lock;
pub mod merkle;
pub mod pipeline;
pub mod sign;

pub use anchor::{AnchorManager, AnchorRecord, AnchorTarget};
pub use chain::HashChainState;
pub use event::{Event, EventHeader, SealedEvent};
pub use hash::{Digest, HashAlgorithm, HashFunction, HashRegistry};
pub use merkle::{AuditPath, ClosedBatch, MerkleAccumulator, MerkleRoot};
pub use pipeline::IntegrityPipeline;
