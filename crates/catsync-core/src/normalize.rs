//! Validation and canonicalization of a single feed record.
//!
//! Field presence follows the feed's truthiness rules: a mandatory field that
//! is missing, `null`, `false`, numerically zero, or an empty string counts as
//! absent.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Some upstream exports embed a JSON fragment in the tag string instead of a
/// plain list; only this one key is recognised.
static ETIQUETAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""etiquetas"\s*:\s*"([^"]*)""#).expect("valid etiquetas regex")
});

/// A feed record that passed validation, ready for diffing against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub price: Decimal,
    /// Stable external key used to match the record to a stored product.
    pub code: String,
    /// Secondary external identifier; empty when the feed omits it.
    pub asin: String,
    pub category: String,
    /// Main image URL; empty when the feed omits it.
    pub image: String,
    /// Trimmed, lower-cased, de-duplicated tag names in sorted order.
    pub tags: Vec<String>,
}

/// Why a record was skipped. Rejections are counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has unsupported type {found}")]
    InvalidField { field: &'static str, found: String },

    #[error("price {0} is not a non-negative number")]
    InvalidPrice(String),

    #[error("category '{0}' could not be created")]
    CategoryRejected(String),
}

/// Validates and canonicalizes one raw feed record.
///
/// # Errors
///
/// Returns a [`Rejection`] when a mandatory field (`title`, `price`, `code`,
/// `category`) is absent or falsy, has an unusable type, or when `price`
/// does not coerce to a non-negative decimal.
pub fn normalize_record(raw: &Value) -> Result<NormalizedRecord, Rejection> {
    let Value::Object(fields) = raw else {
        return Err(Rejection::NotAnObject);
    };

    let title = required_text(fields.get("title"), "title")?;
    let price = required_price(fields.get("price"))?;
    let code = required_text(fields.get("code"), "code")?;
    let category = required_text(fields.get("category"), "category")?;

    let asin = fields
        .get("asin")
        .and_then(text_value)
        .unwrap_or_default();
    let image = fields
        .get("image")
        .and_then(text_value)
        .unwrap_or_default();
    let tags = normalize_tags(fields.get("tags"));

    Ok(NormalizedRecord {
        title,
        price,
        code,
        asin,
        category,
        image,
        tags,
    })
}

/// Normalizes the `tags` field into a sorted, de-duplicated list.
///
/// Accepts an array of strings or a single comma-separated string. Non-string
/// array elements and any other shape are ignored.
#[must_use]
pub fn normalize_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => collect_tags(items.iter().filter_map(Value::as_str)),
        Some(Value::String(raw)) => {
            let source = extract_etiquetas(raw).unwrap_or(raw.as_str());
            collect_tags(source.split(','))
        }
        _ => Vec::new(),
    }
}

fn extract_etiquetas(raw: &str) -> Option<&str> {
    ETIQUETAS_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn collect_tags<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    tokens
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reads a scalar as text. Strings must be non-empty; non-zero numbers are
/// rendered in their JSON form. Everything else yields `None`.
pub(crate) fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if !is_zero(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(value: Option<&Value>, field: &'static str) -> Result<String, Rejection> {
    match value {
        None => Err(Rejection::MissingField(field)),
        Some(v) if is_falsy(v) => Err(Rejection::MissingField(field)),
        Some(v) => text_value(v).ok_or_else(|| Rejection::InvalidField {
            field,
            found: type_name(v).to_string(),
        }),
    }
}

fn required_price(value: Option<&Value>) -> Result<Decimal, Rejection> {
    let value = match value {
        None => return Err(Rejection::MissingField("price")),
        Some(v) if is_falsy(v) => return Err(Rejection::MissingField("price")),
        Some(v) => v,
    };

    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(Rejection::InvalidPrice(other.to_string())),
    };

    let price = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| Rejection::InvalidPrice(raw.clone()))?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(Rejection::InvalidPrice(raw));
    }

    Ok(price.normalize())
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => is_zero(n),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn is_zero(n: &serde_json::Number) -> bool {
    n.as_f64().is_some_and(|f| f == 0.0)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
