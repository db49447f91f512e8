//! Column conversions for the SQLite schema
//!
//! Flags are 0/1 integers, alias lists and season layouts are JSON text,
//! timestamps are RFC 3339 text. Rows written by hand through the sqlite
//! shell may carry `datetime('now')` timestamps, which are accepted too.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Alias list as a JSON array
pub fn vec_to_json<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| String::from("[]"))
}

/// Alias list from a JSON array; a corrupt value reads as no aliases
pub fn json_to_vec<T: DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| String::from("null"))
}

pub fn now_iso8601() -> String {
    datetime_to_str(Utc::now())
}

pub fn datetime_to_str(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub fn datetime_opt_to_str(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(datetime_to_str)
}

pub fn str_to_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME)
        .map(|naive| naive.and_utc())
        .map_err(|e| anyhow!("Invalid timestamp {:?}: {}", raw, e))
}

/// Nullable timestamp column; an empty string counts as NULL
pub fn str_to_datetime_opt(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.filter(|s| !s.is_empty()).map(str_to_datetime).transpose()
}

pub fn bool_to_int(flag: bool) -> i32 {
    i32::from(flag)
}

pub fn int_to_bool(value: i32) -> bool {
    value != 0
}

/// Season, episode and absolute numbers are stored as INTEGER
pub fn int_to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{} out of range: {}", column, value))
}

/// Surface a conversion failure from a `FromRow` impl
pub fn decode_err(e: anyhow::Error) -> sqlx::Error {
    sqlx::Error::Decode(e.into())
}
