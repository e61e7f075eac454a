//! Argument validators shared by HTTP query parameters and WebSocket events.
//!
//! All validators take a [`serde_json::Value`]: WebSocket events already
//! carry JSON values, and HTTP query strings are wrapped as
//! `Value::String` before validation.

use kvmd_core::{clamp_delta, MouseRange};
use serde_json::Value;

use super::errors::ValidatorError;

/// Mouse buttons accepted by the HID layer.
pub const MOUSE_BUTTONS: [&str; 5] = ["left", "right", "middle", "up", "down"];

const MAX_KEY_NAME_LEN: usize = 64;

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

fn invalid(value: &Value, what: &str) -> ValidatorError {
    ValidatorError(format!(
        "The argument {} is not a valid {what}",
        describe(value)
    ))
}

/// Parses a boolean written as a JSON bool, `0`/`1`, or one of
/// `true/false/yes/no/on/off/1/0` (case-insensitive).
pub fn valid_bool(value: &Value) -> Result<bool, ValidatorError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(value, "bool")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(value, "bool")),
        },
        _ => Err(invalid(value, "bool")),
    }
}

/// Parses an integer from a JSON number (fractions truncate) or a numeric string.
pub fn valid_int(value: &Value, what: &str) -> Result<i64, ValidatorError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or_else(|| invalid(value, what)),
        Value::String(s) => s.trim().parse().map_err(|_| invalid(value, what)),
        _ => Err(invalid(value, what)),
    }
}

/// Validates a key name such as `KeyA` or `ShiftLeft`.
pub fn valid_hid_key(value: &Value) -> Result<String, ValidatorError> {
    match value {
        Value::String(s)
            if !s.is_empty()
                && s.len() <= MAX_KEY_NAME_LEN
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(s.clone())
        }
        _ => Err(invalid(value, "keyboard key")),
    }
}

/// Validates a mouse button name.
pub fn valid_hid_mouse_button(value: &Value) -> Result<String, ValidatorError> {
    match value {
        Value::String(s) if MOUSE_BUTTONS.contains(&s.as_str()) => Ok(s.clone()),
        _ => Err(invalid(value, "mouse button")),
    }
}

/// Validates an absolute coordinate, clamping it into the wire range.
pub fn valid_hid_mouse_move(value: &Value) -> Result<i32, ValidatorError> {
    let v = valid_int(value, "mouse move")?;
    Ok(v.clamp(MouseRange::MIN as i64, MouseRange::MAX as i64) as i32)
}

/// Validates a relative or wheel delta, clamping it to `-127..=127`.
pub fn valid_hid_mouse_delta(value: &Value) -> Result<i32, ValidatorError> {
    let v = valid_int(value, "mouse delta")?;
    Ok(clamp_delta(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32))
}

/// Validates an optional output name (`None` and `""` both mean "unchanged").
pub fn valid_hid_output(value: Option<&Value>) -> Result<Option<String>, ValidatorError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s))
            if s.len() <= MAX_KEY_NAME_LEN
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(Some(s.clone()))
        }
        Some(other) => Err(invalid(other, "HID output")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
