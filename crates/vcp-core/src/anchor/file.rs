//! Append-only local ledger target.
//!
//! Each anchor appends one JSON line to a file:
//!
//! ```text
//! {"anchored_at":"...","batch_id":3,"merkle_root":"<hex>","sequence":0}
//! ```
//!
//! The proof is `{"commitment":"<blake3 of the line>","sequence":N}`. A record
//! verifies while line `N` of the file is byte-identical to what was written.
//! Stands in for a certified database in deployments and tests.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AnchorRecord, AnchorTarget, AnchorType, TargetError};
use crate::event::canonical::canonicalize_serialize;
use crate::hash::Digest;
use crate::merkle::MerkleRoot;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerLine {
    sequence: u64,
    batch_id: u64,
    merkle_root: Digest,
    anchored_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerProof {
    sequence: u64,
    commitment: String,
}

/// Anchor target writing to a local JSONL file.
#[derive(Debug)]
pub struct FileLedgerTarget {
    name: String,
    path: PathBuf,
    append: Mutex<()>,
}

impl FileLedgerTarget {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            append: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        match fs::File::open(&self.path) {
            Ok(file) => BufReader::new(file).lines().collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn append_line(
        &self,
        root: &MerkleRoot,
        now: DateTime<Utc>,
    ) -> Result<(u64, String), TargetError> {
        let _guard = self.append.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(TargetError::rejected)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .map_err(TargetError::rejected)?;
        file.lock_exclusive().map_err(TargetError::rejected)?;

        let result = (|| {
            let sequence = self.read_lines().map_err(TargetError::rejected)?.len() as u64;
            let line = LedgerLine {
                sequence,
                batch_id: root.batch_id,
                merkle_root: root.root,
                anchored_at: now,
            };
            let bytes = canonicalize_serialize(&line).map_err(TargetError::rejected)?;
            file.write_all(&bytes).map_err(TargetError::rejected)?;
            file.write_all(b"\n").map_err(TargetError::rejected)?;
            file.sync_data().map_err(TargetError::rejected)?;
            String::from_utf8(bytes)
                .map(|text| (sequence, text))
                .map_err(TargetError::rejected)
        })();

        let _ = FileExt::unlock(&file);
        result
    }
}

impl AnchorTarget for FileLedgerTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn anchor_type(&self) -> AnchorType {
        AnchorType::FileLedger
    }

    fn anchor(&self, root: &MerkleRoot, now: DateTime<Utc>) -> Result<AnchorRecord, TargetError> {
        let (sequence, line) = self.append_line(root, now)?;
        let proof = LedgerProof {
            sequence,
            commitment: blake3::hash(line.as_bytes()).to_hex().to_string(),
        };
        let proof = serde_json::to_string(&proof).map_err(TargetError::rejected)?;
        debug!(ledger = %self.path.display(), sequence, "root appended to file ledger");
        Ok(AnchorRecord {
            anchor_type: AnchorType::FileLedger,
            target_identifier: self.name.clone(),
            merkle_root: root.root,
            batch_id: root.batch_id,
            anchored_at: now,
            proof,
        })
    }

    fn can_verify(&self, record: &AnchorRecord) -> bool {
        if record.anchor_type != AnchorType::FileLedger || record.target_identifier != self.name {
            return false;
        }
        let Ok(proof) = serde_json::from_str::<LedgerProof>(&record.proof) else {
            return false;
        };
        let Ok(lines) = self.read_lines() else {
            return false;
        };
        let Some(line) = usize::try_from(proof.sequence)
            .ok()
            .and_then(|i| lines.get(i))
        else {
            return false;
        };
        if blake3::hash(line.as_bytes()).to_hex().as_str() != proof.commitment {
            return false;
        }
        serde_json::from_str::<LedgerLine>(line).is_ok_and(|entry| {
            entry.sequence == proof.sequence
                && entry.merkle_root == record.merkle_root
                && entry.batch_id == record.batch_id
        })
    }
}
