//! Anchor state that must survive a restart.
//!
//! Holds the time of the last successful anchor, the retry queue and the
//! roots that ran out of retries. The core defines the shape; [`AnchorState::save`]
//! and [`AnchorState::load`] provide a JSON-file medium for callers that do
//! not bring their own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TargetFailure;
use crate::error::ErrorCode;
use crate::hash::Digest;
use crate::merkle::MerkleRoot;

/// Errors reading or writing persisted anchor state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read anchor state {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("anchor state {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write anchor state {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode anchor state: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StateError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Corrupt { .. } => ErrorCode::StateCorrupt,
            Self::Read { .. } | Self::Write { .. } | Self::Encode(_) => {
                ErrorCode::StateWriteFailed
            }
        }
    }
}

/// A root that failed on every target and awaits retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnchor {
    pub merkle_root: MerkleRoot,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
    /// Failures from the most recent attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_failures: Vec<TargetFailure>,
}

impl PendingAnchor {
    #[must_use]
    pub fn new(
        merkle_root: MerkleRoot,
        queued_at: DateTime<Utc>,
        failures: Vec<TargetFailure>,
    ) -> Self {
        Self {
            merkle_root,
            queued_at,
            retry_count: 0,
            last_failures: failures,
        }
    }
}

/// A root whose retries ran out. Kept until an operator acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonedAnchor {
    pub merkle_root: MerkleRoot,
    pub queued_at: DateTime<Utc>,
    pub abandoned_at: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_failures: Vec<TargetFailure>,
}

/// Everything the anchor manager needs to pick up after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorState {
    #[serde(default)]
    pub last_anchor_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending: Vec<PendingAnchor>,
    #[serde(default)]
    pub abandoned: Vec<AbandonedAnchor>,
}

impl AnchorState {
    /// Load state from `path`. A missing file is the empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Read`] on I/O failure or [`StateError::Corrupt`]
    /// when the file is not valid state JSON.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no anchor state yet; starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write state to `path`, replacing any previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Write`] if the temp file cannot be written or
    /// renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let write_err = |source| StateError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let encoded = serde_json::to_vec_pretty(self).map_err(StateError::Encode)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, encoded).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)?;
        debug!(
            path = %path.display(),
            pending = self.pending.len(),
            abandoned = self.abandoned.len(),
            "anchor state saved"
        );
        Ok(())
    }

    /// Queue a root for retry.
    pub fn enqueue(&mut self, entry: PendingAnchor) {
        self.pending.push(entry);
    }

    /// Whether `root` is pending retry.
    #[must_use]
    pub fn is_pending(&self, root: &Digest) -> bool {
        self.pending.iter().any(|p| p.merkle_root.root == *root)
    }

    /// Drop abandoned entries for `batch_id` once an operator has handled them.
    /// Returns how many entries were removed.
    pub fn acknowledge(&mut self, batch_id: u64) -> usize {
        let before = self.abandoned.len();
        self.abandoned.retain(|a| a.merkle_root.batch_id != batch_id);
        before - self.abandoned.len()
    }
}
