//! Typed event payloads.
//!
//! A payload is a JSON object holding exactly one module section. The known
//! sections (`trade_data`, `vcp_risk`, `vcp_gov`, `error_details`) are
//! statically typed; anything else is kept verbatim as an
//! [`Extension`](Payload::Extension) carrying its canonical bytes, so newer
//! producers stay verifiable by older readers.
//!
//! Unknown fields inside a known section are preserved via
//! `#[serde(flatten)]` and participate in the hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::canonical::{CanonicalBlob, CanonicalError, canonicalize_serialize};
use super::decimal::Decimal;

pub const TRADE_KEY: &str = "trade_data";
pub const RISK_KEY: &str = "vcp_risk";
pub const GOV_KEY: &str = "vcp_gov";
pub const ERROR_KEY: &str = "error_details";

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Order lifecycle data (`SIG` through `CLS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeData {
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Risk limit snapshot or breach (`RSK`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskData {
    pub limit_name: String,
    pub limit_value: Decimal,
    pub current_value: Decimal,
    pub breached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Algorithm governance record (`ALG`, `AUD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceData {
    pub algo_id: String,
    pub algo_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Error or recovery details (`ERR`, `REC`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error_code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The payload of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Trade(TradeData),
    Risk(RiskData),
    Governance(GovernanceData),
    Error(ErrorData),
    /// Any payload shape not covered above, held in canonical form.
    Extension(CanonicalBlob),
}

impl Payload {
    /// Canonical bytes of this payload, as fed to the event hasher.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if a flattened extra field holds a float.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CanonicalError> {
        match self {
            Self::Extension(blob) => Ok(blob.as_bytes().to_vec()),
            typed => canonicalize_serialize(typed),
        }
    }

    /// Section key this payload serializes under, if it is a typed section.
    #[must_use]
    pub const fn section_key(&self) -> Option<&'static str> {
        match self {
            Self::Trade(_) => Some(TRADE_KEY),
            Self::Risk(_) => Some(RISK_KEY),
            Self::Governance(_) => Some(GOV_KEY),
            Self::Error(_) => Some(ERROR_KEY),
            Self::Extension(_) => None,
        }
    }

    /// Build a payload from an arbitrary JSON value.
    ///
    /// A single-key object whose key is a known section is parsed into the
    /// typed variant; everything else becomes an extension.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Json`] if a known section does not match its
    /// schema, or [`CanonicalError::InvalidValueType`] if an extension holds
    /// a float.
    pub fn from_value(value: Value) -> Result<Self, CanonicalError> {
        if let Value::Object(map) = &value
            && map.len() == 1
            && let Some((key, section)) = map.iter().next()
        {
            let typed = match key.as_str() {
                TRADE_KEY => Some(serde_json::from_value(section.clone()).map(Self::Trade)),
                RISK_KEY => Some(serde_json::from_value(section.clone()).map(Self::Risk)),
                GOV_KEY => Some(serde_json::from_value(section.clone()).map(Self::Governance)),
                ERROR_KEY => Some(serde_json::from_value(section.clone()).map(Self::Error)),
                _ => None,
            };
            if let Some(parsed) = typed {
                return Ok(parsed?);
            }
        }
        Ok(Self::Extension(CanonicalBlob::from_value(&value)?))
    }

    fn section_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Trade(d) => serde_json::to_value(d),
            Self::Risk(d) => serde_json::to_value(d),
            Self::Governance(d) => serde_json::to_value(d),
            Self::Error(d) => serde_json::to_value(d),
            Self::Extension(blob) => blob
                .to_value()
                .map_err(serde::ser::Error::custom),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let section = self.section_value().map_err(serde::ser::Error::custom)?;
        match self.section_key() {
            Some(key) => {
                let mut map = Map::with_capacity(1);
                map.insert(key.to_owned(), section);
                Value::Object(map).serialize(serializer)
            }
            None => section.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
