//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the routing kernel.
///
/// Per-message failures inside the dispatch loop never surface as `Error`;
/// they become error-shaped replies or dead letters. These variants cover
/// caller-facing operations: registration, submission and configuration,
/// plus record lookups that agents turn into replies.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed message or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Record or agent not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An agent id is already present in the registry.
    #[error("duplicate agent: {0}")]
    DuplicateAgent(String),

    /// Agent tried to send before being registered (or after removal).
    #[error("agent not attached to an event queue: {0}")]
    NotAttached(String),

    /// Bounded queue rejected a message.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn duplicate_agent(agent_id: impl Into<String>) -> Self {
        Self::DuplicateAgent(agent_id.into())
    }

    pub fn not_attached(agent_id: impl Into<String>) -> Self {
        Self::NotAttached(agent_id.into())
    }

    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::QueueFull(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::duplicate_agent("ehr_agent");
        assert_eq!(err.to_string(), "duplicate agent: ehr_agent");

        let err = Error::queue_full("capacity 2 reached");
        assert!(err.to_string().starts_with("queue full"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
