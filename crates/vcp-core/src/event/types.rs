//! Event type catalog and header enumerations.
//!
//! Each business event carries a three-letter type (`ORD`, `EXE`, ...) and a
//! stable numeric code. Both appear in the hashed header, so neither may ever
//! be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed catalog of trading-system event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Signal generated by a strategy.
    Signal,
    /// Order submitted.
    Order,
    /// Order acknowledged by the venue.
    Ack,
    /// Full execution.
    Execution,
    /// Partial fill.
    PartialFill,
    /// Order rejected.
    Reject,
    /// Order cancelled.
    Cancel,
    /// Order modified.
    Modify,
    /// Position closed.
    Close,
    /// Algorithm parameter or version change.
    Algorithm,
    /// Risk limit breach or risk parameter change.
    Risk,
    /// Audit/governance record.
    Audit,
    /// Liveness heartbeat.
    Heartbeat,
    /// System error.
    Error,
    /// Recovery after an outage.
    Recovery,
    /// Clock synchronization status change.
    ClockSync,
}

/// Error returned when parsing an unknown event type string or code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of SIG, ORD, ACK, EXE, PRT, REJ, \
             CXL, MOD, CLS, ALG, RSK, AUD, HBT, ERR, REC, SNC",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 16] = [
        Self::Signal,
        Self::Order,
        Self::Ack,
        Self::Execution,
        Self::PartialFill,
        Self::Reject,
        Self::Cancel,
        Self::Modify,
        Self::Close,
        Self::Algorithm,
        Self::Risk,
        Self::Audit,
        Self::Heartbeat,
        Self::Error,
        Self::Recovery,
        Self::ClockSync,
    ];

    /// Three-letter wire mnemonic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "SIG",
            Self::Order => "ORD",
            Self::Ack => "ACK",
            Self::Execution => "EXE",
            Self::PartialFill => "PRT",
            Self::Reject => "REJ",
            Self::Cancel => "CXL",
            Self::Modify => "MOD",
            Self::Close => "CLS",
            Self::Algorithm => "ALG",
            Self::Risk => "RSK",
            Self::Audit => "AUD",
            Self::Heartbeat => "HBT",
            Self::Error => "ERR",
            Self::Recovery => "REC",
            Self::ClockSync => "SNC",
        }
    }

    /// Stable numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Signal => 1,
            Self::Order => 2,
            Self::Ack => 3,
            Self::Execution => 4,
            Self::PartialFill => 5,
            Self::Reject => 6,
            Self::Cancel => 7,
            Self::Modify => 8,
            Self::Close => 9,
            Self::Algorithm => 20,
            Self::Risk => 21,
            Self::Audit => 22,
            Self::Heartbeat => 98,
            Self::Error => 99,
            Self::Recovery => 100,
            Self::ClockSync => 101,
        }
    }

    /// Look up an event type by its numeric code.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventType`] if no type has that code.
    pub fn from_code(code: u8) -> Result<Self, UnknownEventType> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| UnknownEventType {
                raw: code.to_string(),
            })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Declared precision of `timestamp_int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampPrecision {
    Nanosecond,
    #[default]
    Microsecond,
    Millisecond,
}

/// Clock synchronization state of the producer at event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockSyncStatus {
    PtpLocked,
    NtpSynced,
    #[default]
    BestEffort,
    Unreliable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_roundtrip() {
        let mut seen = std::collections::HashSet::new();
        for et in EventType::ALL {
            assert!(seen.insert(et.code()), "duplicate code {}", et.code());
            assert_eq!(EventType::from_code(et.code()).expect("known code"), et);
        }
    }

    #[test]
    fn fromstr_all_types() {
        for et in EventType::ALL {
            let parsed: EventType = et.as_str().parse().expect("should parse");
            assert_eq!(parsed, et);
        }
    }

    #[test]
    fn fromstr_rejects_unknown() {
        let err = "XYZ".parse::<EventType>().expect_err("unknown");
        assert_eq!(err.raw, "XYZ");
        assert!(err.to_string().contains("expected one of"));
        assert!("ord".parse::<EventType>().is_err(), "mnemonics are case-sensitive");
    }

    #[test]
    fn from_code_rejects_gap() {
        assert!(EventType::from_code(10).is_err());
    }

    #[test]
    fn serde_uses_mnemonic() {
        assert_eq!(serde_json::to_string(&EventType::Execution).expect("ser"), "\"EXE\"");
        let back: EventType = serde_json::from_str("\"SNC\"").expect("de");
        assert_eq!(back, EventType::ClockSync);
    }

    #[test]
    fn header_enums_use_screaming_case() {
        assert_eq!(
            serde_json::to_string(&ClockSyncStatus::PtpLocked).expect("ser"),
            "\"PTP_LOCKED\""
        );
        assert_eq!(
            serde_json::to_string(&TimestampPrecision::Nanosecond).expect("ser"),
            "\"NANOSECOND\""
        );
    }
}
