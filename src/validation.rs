//! Field-presence validation for inbound messages.
//!
//! Only structural checks live here; payload schemas belong to the agents.

use crate::types::{Error, Result};

/// Validate that a string field is present and not blank.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a payload is present (`{}` is fine, `null` is not).
pub fn validate_present(value: &serde_json::Value, field: &str) -> Result<()> {
    if value.is_null() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}
