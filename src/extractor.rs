//! Value extraction from response bodies.
//!
//! The chain scenario needs the identifier of the entity it just created.
//! Extraction failures are not errors for the run: the caller treats them
//! as "no identifier" and skips the dependent steps.

use serde_json::Value;
use serde_json_path::JsonPath;
use thiserror::Error;
use tracing::debug;

/// JSONPath candidates for the created expenditure id, tried in order.
///
/// The API wraps payloads in `{"result": "SUCCESS", "data": {...}}`; the
/// bare form is accepted for servers that do not.
pub const EXPENDITURE_ID_PATHS: &[&str] = &["$.data.expenditureId", "$.expenditureId"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("JSONPath query failed: {0}")]
    JsonPathError(String),

    #[error("JSONPath '{0}' did not match exactly one value")]
    NoMatch(String),

    #[error("Value at '{path}' is not an identifier: {value}")]
    NotAnIdentifier { path: String, value: String },
}

/// Extracts the single value at `path` as a string.
///
/// # Example
/// ```
/// use finance_loadtest::extractor::extract_json_path;
///
/// let body = r#"{"result": "SUCCESS", "data": {"expenditureId": 42}}"#;
/// assert_eq!(extract_json_path(body, "$.data.expenditureId").unwrap(), "42");
/// ```
pub fn extract_json_path(json_body: &str, path: &str) -> Result<String, ExtractionError> {
    let json: Value =
        serde_json::from_str(json_body).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;
    let value = query_one(&json, path)?;
    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn query_one(json: &Value, path: &str) -> Result<Value, ExtractionError> {
    let json_path = JsonPath::parse(path)
        .map_err(|e| ExtractionError::JsonPathError(format!("Invalid JSONPath: {}", e)))?;
    json_path
        .query(json)
        .exactly_one()
        .cloned()
        .map_err(|_| ExtractionError::NoMatch(path.to_string()))
}

/// Extracts an identifier: a positive integer, or a numeric string.
fn identifier_at(json: &Value, path: &str) -> Result<u64, ExtractionError> {
    let value = query_one(json, path)?;
    let id = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.filter(|id| *id > 0)
        .ok_or_else(|| ExtractionError::NotAnIdentifier {
            path: path.to_string(),
            value: value.to_string(),
        })
}

/// Returns the first identifier found at any of `paths`.
pub fn extract_identifier(json_body: &str, paths: &[&str]) -> Result<u64, ExtractionError> {
    let json: Value =
        serde_json::from_str(json_body).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

    let mut last_error = ExtractionError::NoMatch(paths.join(", "));
    for path in paths {
        match identifier_at(&json, path) {
            Ok(id) => {
                debug!(path = %path, id, "Extracted identifier");
                return Ok(id);
            }
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}
