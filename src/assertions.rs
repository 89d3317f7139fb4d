//! Response status checks.
//!
//! Each step declares the set of status codes it accepts. A check never
//! aborts the run: the outcome is returned and recorded, and the caller
//! decides whether dependent steps still make sense.

use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::status_reason;

/// Status codes a step treats as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedStatus(&'static [u16]);

impl ExpectedStatus {
    pub const OK: ExpectedStatus = ExpectedStatus(&[200]);
    pub const CREATED: ExpectedStatus = ExpectedStatus(&[201]);
    /// Create-if-absent: a conflict means the entity already exists, which
    /// is the state the caller wanted.
    pub const CREATED_OR_CONFLICT: ExpectedStatus = ExpectedStatus(&[201, 409]);
    pub const OK_OR_NO_CONTENT: ExpectedStatus = ExpectedStatus(&[200, 204]);

    pub fn accepts(&self, status_code: u16) -> bool {
        self.0.contains(&status_code)
    }

    /// `"200"`, `"201|409"`.
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Why a check failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("Status code mismatch: expected {expected}, got {actual} ({reason})")]
    UnexpectedStatus {
        expected: String,
        actual: u16,
        reason: &'static str,
    },

    #[error("Request failed: {0}")]
    Transport(String),
}

/// Name of the check recorded for a step, e.g. `"expenditure create 201"`.
pub fn check_name(step: &str, expected: ExpectedStatus) -> String {
    format!("{} {}", step.replace('_', " "), expected.label())
}

/// Checks `status_code` against the accepted set.
pub fn check_status(
    step: &str,
    expected: ExpectedStatus,
    status_code: u16,
) -> Result<(), CheckError> {
    if expected.accepts(status_code) {
        debug!(step = step, status_code, "Check passed");
        Ok(())
    } else {
        let err = CheckError::UnexpectedStatus {
            expected: expected.label(),
            actual: status_code,
            reason: status_reason(status_code),
        };
        warn!(step = step, error = %err, "Check failed");
        Err(err)
    }
}
