//! Event model: header, payload, and the sealed form carrying integrity data.
//!
//! An [`Event`] is what a producer hands to the pipeline. Header and payload
//! are immutable once hashed. A [`SealedEvent`] is the same event plus a
//! [`Security`] block holding the event hash, the chain pointer, optional
//! signature and the Merkle leaf position.

pub mod canonical;
pub mod decimal;
pub mod payload;
pub mod types;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::Digest;
use payload::Payload;
use types::{ClockSyncStatus, EventType, TimestampPrecision};

/// Identification and timing fields of an event. All fields are hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub event_id: String,
    pub trace_id: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_int: i64,
    pub timestamp_iso: String,
    pub event_type: EventType,
    pub event_type_code: u8,
    #[serde(default)]
    pub timestamp_precision: TimestampPrecision,
    #[serde(default)]
    pub clock_sync_status: ClockSyncStatus,
    pub venue_id: String,
    pub symbol: String,
    pub account_id: String,
}

impl EventHeader {
    /// Build a header, deriving the numeric code and both timestamp forms.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event_type: EventType,
        at: DateTime<Utc>,
        venue_id: impl Into<String>,
        symbol: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        let event_id = event_id.into();
        Self {
            trace_id: event_id.clone(),
            event_id,
            timestamp_int: at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000)),
            timestamp_iso: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            event_type,
            event_type_code: event_type.code(),
            timestamp_precision: TimestampPrecision::default(),
            clock_sync_status: ClockSyncStatus::default(),
            venue_id: venue_id.into(),
            symbol: symbol.into(),
            account_id: account_id.into(),
        }
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    #[must_use]
    pub const fn with_clock(
        mut self,
        precision: TimestampPrecision,
        status: ClockSyncStatus,
    ) -> Self {
        self.timestamp_precision = precision;
        self.clock_sync_status = status;
        self
    }

    /// True when `event_type_code` agrees with `event_type`.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.event_type_code == self.event_type.code()
    }
}

/// An unsealed business event as produced by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub header: EventHeader,
    pub payload: Payload,
}

impl Event {
    #[must_use]
    pub const fn new(header: EventHeader, payload: Payload) -> Self {
        Self { header, payload }
    }
}

/// Integrity data attached to an event once it has been hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub event_hash: Digest,
    /// Chain pointer used as hash input; genesis sentinel when unchained.
    pub prev_hash: Digest,
    pub hash_algo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_algo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_index: Option<u64>,
}

/// An event plus its integrity data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEvent {
    pub header: EventHeader,
    pub payload: Payload,
    pub security: Security,
}

impl SealedEvent {
    #[must_use]
    pub const fn event_hash(&self) -> &Digest {
        &self.security.event_hash
    }

    #[must_use]
    pub const fn prev_hash(&self) -> &Digest {
        &self.security.prev_hash
    }
}
