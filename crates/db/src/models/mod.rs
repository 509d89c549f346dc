//! Row models for the SQLite store.
//!
//! Rows hold what SQLite holds: TEXT for ids, timestamps, enums, and JSON.
//! Conversion to the domain types lives next to each row.

pub mod decision;
pub mod operation;

use chrono::{DateTime, SecondsFormat, Utc};
use fieldledger_core::types::Timestamp;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Fixed-width RFC 3339 so lexical order matches chronological order.
pub fn encode_ts(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_ts(column: &str, raw: &str) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

pub fn decode_opt_ts(column: &str, raw: Option<&str>) -> Result<Option<Timestamp>, StoreError> {
    raw.map(|r| decode_ts(column, r)).transpose()
}

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

pub fn encode_opt_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, StoreError> {
    value.map(encode_json).transpose()
}

pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn decode_opt_json<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, StoreError> {
    raw.map(decode_json).transpose()
}

pub fn decode_uuid(column: &str, raw: &str) -> Result<uuid::Uuid, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}
