//! Canonical JSON emission (RFC 8785) for machine-readable output

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize `value` as JCS canonical JSON.
///
/// Keys are sorted and whitespace is removed, so two reports describing the same
/// run state diff cleanly.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
