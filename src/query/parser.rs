//! Converts raw runtime output into structured results.
//!
//! Only JSON is decoded; csv, table and text are presentation formats and pass
//! through untouched.

use serde_json::Value;

use super::types::{QueryResult, Record};
use crate::config::OutputFormat;
use crate::error::{ClientError, Result};

/// Maximum characters of offending output quoted in a parse error.
const MAX_ERROR_SNIPPET: usize = 256;

/// Parses raw output according to the requested format.
pub fn parse(raw: &str, format: OutputFormat) -> Result<QueryResult> {
    if format.is_structured() {
        parse_records(raw).map(QueryResult::Records)
    } else {
        Ok(QueryResult::Text(raw.to_string()))
    }
}

/// Decodes a JSON array of objects.
///
/// Blank output and a bare `null` both mean "no rows".
pub fn parse_records(raw: &str) -> Result<Vec<Record>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ClientError::parse(format!("{e}: {}", snippet(trimmed))))?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(ClientError::parse(format!(
                    "expected an object at index {i}, got {}",
                    snippet(&other.to_string())
                ))),
            })
            .collect(),
        other => Err(ClientError::parse(format!(
            "expected an array of records, got {}",
            snippet(&other.to_string())
        ))),
    }
}

/// Serializes records back to the runtime's JSON shape.
pub fn to_json(records: &[Record]) -> Result<String> {
    serde_json::to_string(records)
        .map_err(|e| ClientError::internal(format!("Failed to serialize records: {e}")))
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_SNIPPET {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_ERROR_SNIPPET).collect();
        format!("{head}...")
    }
}
