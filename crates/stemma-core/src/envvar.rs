//! Typed environment-variable parsing helpers.
//!
//! All Stemma configuration is environment-driven. These helpers treat
//! empty or whitespace-only values as unset, and parse failures as hard
//! errors so misconfiguration is caught at startup rather than silently
//! ignored. Threshold-style variables use the `*_or_default` variants,
//! which fall back to the default on out-of-range values instead.

use crate::error::{Error, Result};

/// Reads a string variable. Empty and whitespace-only values are unset.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Reads a `u16` variable.
///
/// # Errors
///
/// Returns an error if the variable is present but not a valid `u16`.
pub fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

/// Reads a `u64` variable.
///
/// # Errors
///
/// Returns an error if the variable is present but not a valid `u64`.
pub fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

/// Reads a boolean variable (`true/false/1/0/yes/no`).
///
/// # Errors
///
/// Returns an error if the variable is present but not a recognized boolean.
pub fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

/// Parses a boolean value with the variable name included in errors.
///
/// # Errors
///
/// Returns an error if the value is not a recognized boolean.
pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

/// Reads a threshold-style float, falling back to `default` when the
/// variable is unset, unparseable, non-finite, or negative.
#[must_use]
pub fn env_f64_or(name: &str, default: f64) -> f64 {
    let Some(v) = env_string(name) else {
        return default;
    };
    match v.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => parsed,
        _ => {
            tracing::warn!(var = name, value = %v, "ignoring out-of-range threshold; using default");
            default
        }
    }
}

/// Reads a threshold-style integer, falling back to `default` when the
/// variable is unset, unparseable, or negative.
#[must_use]
pub fn env_i64_or(name: &str, default: i64) -> i64 {
    let Some(v) = env_string(name) else {
        return default;
    };
    match v.parse::<i64>() {
        Ok(parsed) if parsed >= 0 => parsed,
        _ => {
            tracing::warn!(var = name, value = %v, "ignoring out-of-range threshold; using default");
            default
        }
    }
}
