//! Input sanitization for outbound requests.
//!
//! Rejects null bytes anywhere in the URL, headers or body, and strips
//! unsafe control characters from header values and JSON body strings.

use serde_json::Value;

use crate::{Error, Result};

/// Characters that are always rejected (null byte).
const REJECTED_BYTE: u8 = 0x00;

/// Control characters to strip (C0 range excluding common whitespace).
/// We preserve: `\t` (0x09), `\n` (0x0A), `\r` (0x0D).
fn is_unsafe_control(c: char) -> bool {
    let code = c as u32;
    // C0 control characters minus tab, newline, carriage return
    (code <= 0x1F && code != 0x09 && code != 0x0A && code != 0x0D)
    || code == 0x7F
    // C1 control characters
    || (0x80..=0x9F).contains(&code)
    || c == '\u{200B}' // zero-width space
    || c == '\u{200C}' // zero-width non-joiner
    || c == '\u{200D}' // zero-width joiner
    || c == '\u{FEFF}' // byte order mark
    || c == '\u{2028}' // line separator
    || c == '\u{2029}' // paragraph separator
}

/// Check if a string contains null bytes.
fn contains_null_byte(s: &str) -> bool {
    s.as_bytes().contains(&REJECTED_BYTE)
}

/// Reject a field that contains null bytes.
///
/// # Errors
///
/// Returns `Error::InvalidParams` naming the field.
pub fn reject_null_bytes(field: &str, s: &str) -> Result<()> {
    if contains_null_byte(s) {
        return Err(Error::InvalidParams(format!(
            "{field} contains null bytes which are not allowed"
        )));
    }
    Ok(())
}

/// Sanitize a header value: reject null bytes, strip unsafe control
/// characters and line breaks (header injection).
///
/// # Errors
///
/// Returns `Error::InvalidParams` if the value contains null bytes.
pub fn sanitize_header_value(name: &str, value: &str) -> Result<String> {
    reject_null_bytes(&format!("header '{name}'"), value)?;
    Ok(value
        .chars()
        .filter(|c| !is_unsafe_control(*c) && *c != '\r' && *c != '\n')
        .collect())
}

/// Sanitize a single string value: reject null bytes, strip unsafe
/// control characters.
fn sanitize_string(s: &str) -> Result<String> {
    reject_null_bytes("body", s)?;
    Ok(s.chars().filter(|c| !is_unsafe_control(*c)).collect())
}

/// Recursively sanitize all string values in a JSON body.
///
/// # Errors
///
/// Returns `Error::InvalidParams` if any key or string contains null bytes.
pub fn sanitize_json_value(value: &Value) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(sanitize_string(s)?)),
        Value::Array(arr) => arr
            .iter()
            .map(sanitize_json_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                sanitized.insert(sanitize_string(key)?, sanitize_json_value(val)?);
            }
            Ok(Value::Object(sanitized))
        }
        other => Ok(other.clone()),
    }
}
