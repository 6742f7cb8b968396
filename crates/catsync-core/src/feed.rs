//! Feed envelope handling: turning a JSON payload into the ordered list of raw
//! records the engine consumes.
//!
//! A raw record is any JSON value. Field-level validation is the job of
//! [`crate::normalize`]; this module only decides what the records are.

use serde_json::Value;

/// Parses a feed document from raw bytes.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if the bytes are not valid JSON.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Value>, serde_json::Error> {
    let document: Value = serde_json::from_slice(bytes)?;
    Ok(feed_records(document))
}

/// Splits a feed document into records.
///
/// An array yields its elements in order; any other value is treated as a
/// single-record feed.
#[must_use]
pub fn feed_records(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Returns the record's `code` as it will be matched against the store, if
/// the record carries a usable one.
///
/// Used to build the set of codes "present in the feed" for the availability
/// sweep, which includes records that are later omitted for other reasons.
#[must_use]
pub fn record_code(record: &Value) -> Option<String> {
    record.get("code").and_then(crate::normalize::text_value)
}
