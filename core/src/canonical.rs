//! Canonical text encoding for artifact payloads.
//!
//! - Object keys are emitted in sorted order
//! - Arrays keep their order
//! - Floats are rounded to [`FLOAT_DECIMALS`] places and printed without
//!   trailing zeros, so values that differ only by float noise encode the same
//! - No whitespace between tokens
//! - NaN and infinities are rejected, never coerced

use crate::value::{FieldPath, Value};

pub const FLOAT_DECIMALS: usize = 6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanonicalError {
    #[error("non-canonical value at {path}: {reason}")]
    NonCanonicalValue { path: String, reason: String },
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

pub fn canonicalize(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    let mut path = FieldPath::root();
    write_value(value, &mut path, &mut out)?;
    Ok(out)
}

pub fn parse(text: &str) -> Result<Value, CanonicalError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|err| CanonicalError::MalformedDocument(err.to_string()))
}

/// Parses already-encoded text and encodes it again.
pub fn recanonicalize(text: &str) -> Result<String, CanonicalError> {
    canonicalize(&parse(text)?)
}

pub fn format_float(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let mut text = format!("{:.*}", FLOAT_DECIMALS, value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    Some(text)
}

fn write_value(value: &Value, path: &mut FieldPath, out: &mut String) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Int(number) => out.push_str(&number.to_string()),
        Value::Float(number) => {
            let text = format_float(*number).ok_or_else(|| CanonicalError::NonCanonicalValue {
                path: path.to_string(),
                reason: format!("{number} has no canonical form"),
            })?;
            out.push_str(&text);
        }
        Value::String(text) => write_string(text, path, out)?,
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                path.push_index(index);
                write_value(item, path, out)?;
                path.pop();
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (index, (key, item)) in map.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, path, out)?;
                out.push(':');
                path.push_key(key.as_str());
                write_value(item, path, out)?;
                path.pop();
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(text: &str, path: &FieldPath, out: &mut String) -> Result<(), CanonicalError> {
    let encoded = serde_json::to_string(text).map_err(|err| CanonicalError::NonCanonicalValue {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    out.push_str(&encoded);
    Ok(())
}
