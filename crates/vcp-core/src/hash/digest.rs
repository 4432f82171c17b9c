//! 32-byte digest newtype shared by event hashes, chain pointers, Merkle nodes
//! and roots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length in bytes of every digest vcp produces.
pub const DIGEST_LEN: usize = 32;

/// Error returned when a hex string is not a 32-byte digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest {raw:?}: expected {} hex characters", DIGEST_LEN * 2)]
pub struct DigestParseError {
    pub raw: String,
}

/// A 32-byte hash value, displayed as 64 lower-case hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The all-zero value.
    ///
    /// Used both as the genesis `previous_hash` of a chain and as the root of
    /// an empty Merkle batch.
    pub const ZERO: Self = Self([0u8; DIGEST_LEN]);

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// Lower-case hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string (either case).
    ///
    /// # Errors
    ///
    /// Returns [`DigestParseError`] on wrong length or non-hex characters.
    pub fn from_hex(raw: &str) -> Result<Self, DigestParseError> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(raw, &mut out).map_err(|_| DigestParseError {
            raw: raw.to_owned(),
        })?;
        Ok(Self(out))
    }

    /// Return a copy with one bit flipped. Handy for tamper tests.
    #[must_use]
    pub fn with_flipped_bit(mut self, bit: usize) -> Self {
        let bit = bit % (DIGEST_LEN * 8);
        self.0[bit / 8] ^= 1 << (bit % 8);
        self
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_displays_as_64_zeros() {
        assert_eq!(Digest::ZERO.to_string(), "0".repeat(64));
        assert!(Digest::ZERO.is_zero());
    }

    #[test]
    fn hex_is_lower_case_and_parses_either_case() {
        let d = Digest([0xAB; DIGEST_LEN]);
        assert_eq!(d.to_hex(), "ab".repeat(32));
        assert_eq!(Digest::from_hex(&"AB".repeat(32)).expect("upper"), d);
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex(&"zz".repeat(32)).is_err());
        assert!(Digest::from_hex(&"00".repeat(33)).is_err());
    }

    #[test]
    fn flipped_bit_differs() {
        let d = Digest([7; DIGEST_LEN]);
        assert_ne!(d.with_flipped_bit(0), d);
        assert_eq!(d.with_flipped_bit(9).with_flipped_bit(9), d);
    }

    #[test]
    fn serde_as_hex_string() {
        let d = Digest([1; DIGEST_LEN]);
        let json = serde_json::to_string(&d).expect("ser");
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Digest = serde_json::from_str(&json).expect("de");
        assert_eq!(back, d);
    }
}
