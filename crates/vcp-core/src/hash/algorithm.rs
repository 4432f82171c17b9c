//! Hash function capability and the registry of supported algorithms.
//!
//! Every algorithm is identified by a lower-case name (used in config and in
//! the `hash_algo` security field) and a one-byte tag that is prepended to
//! event-hash input. Tags are part of the hash contract and are never reused.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest as _, Sha256};

use super::HashError;
use super::digest::Digest;

/// Tag reserved for SHA3-256 so a future registration cannot collide with it.
pub const RESERVED_SHA3_256_TAG: u8 = 0x02;

/// A pluggable 32-byte hash function.
///
/// Implementations must be pure: the same input always yields the same
/// digest, on every platform.
pub trait HashFunction: Send + Sync + fmt::Debug {
    /// Lower-case algorithm name, e.g. `"sha256"`.
    fn name(&self) -> &str;

    /// One-byte algorithm tag prepended to event-hash input.
    fn tag(&self) -> u8;

    /// Hash a single buffer.
    fn digest(&self, data: &[u8]) -> Digest;

    /// Hash the concatenation of `parts` without materializing it.
    fn digest_parts(&self, parts: &[&[u8]]) -> Digest {
        self.digest(&parts.concat())
    }
}

/// The built-in algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [Self; 2] = [Self::Sha256, Self::Blake3];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl HashFunction for HashAlgorithm {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Sha256 => 0x01,
            Self::Blake3 => 0x03,
        }
    }

    fn digest(&self, data: &[u8]) -> Digest {
        self.digest_parts(&[data])
    }

    fn digest_parts(&self, parts: &[&[u8]]) -> Digest {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                let mut out = [0u8; 32];
                out.copy_from_slice(&hasher.finalize());
                Digest(out)
            }
            Self::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for part in parts {
                    hasher.update(part);
                }
                Digest(*hasher.finalize().as_bytes())
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| HashError::UnsupportedAlgorithm { name: s.to_owned() })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Closed set of hash functions available to a deployment.
///
/// Resolve the configured algorithm once at startup; an unknown name fails
/// there rather than on the first event.
#[derive(Debug, Clone, Default)]
pub struct HashRegistry {
    functions: Vec<Arc<dyn HashFunction>>,
}

impl HashRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`HashAlgorithm`].
    #[must_use]
    pub fn with_builtins() -> Self {
        Self {
            functions: HashAlgorithm::ALL
                .into_iter()
                .map(|a| Arc::new(a) as Arc<dyn HashFunction>)
                .collect(),
        }
    }

    /// Add a hash function.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::DuplicateAlgorithm`] if the name or tag is already
    /// taken (including the reserved SHA3-256 tag).
    pub fn register(&mut self, function: Arc<dyn HashFunction>) -> Result<(), HashError> {
        let clash = self
            .functions
            .iter()
            .any(|f| f.name() == function.name() || f.tag() == function.tag());
        let reserved = function.tag() == RESERVED_SHA3_256_TAG && function.name() != "sha3-256";
        if clash || reserved {
            return Err(HashError::DuplicateAlgorithm {
                name: function.name().to_owned(),
                tag: function.tag(),
            });
        }
        self.functions.push(function);
        Ok(())
    }

    /// Look up a hash function by name.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnsupportedAlgorithm`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn HashFunction>, HashError> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .cloned()
            .ok_or_else(|| HashError::UnsupportedAlgorithm {
                name: name.to_owned(),
            })
    }

    /// Look up a hash function by tag.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnsupportedAlgorithm`] for unknown tags.
    pub fn by_tag(&self, tag: u8) -> Result<Arc<dyn HashFunction>, HashError> {
        self.functions
            .iter()
            .find(|f| f.tag() == tag)
            .cloned()
            .ok_or_else(|| HashError::UnsupportedAlgorithm {
                name: format!("tag 0x{tag:02x}"),
            })
    }

    /// Names of all registered algorithms, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name()).collect()
    }
}
