//! Result shapes returned by `process_message`.
//!
//! Handlers never fail past the orchestrator boundary. Failures are data:
//!
//! ```text
//! {"status": "success", ...fields}
//! {"status": "error",   "message": "..."}
//! {"status": "denied",  "reason":  "..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Value of the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Error,
    Denied,
}

/// Success reply. Object fields are merged next to `status`; anything else is
/// wrapped under `result`.
pub fn success(fields: Value) -> Value {
    let mut body = match fields {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    body.insert("status".to_string(), json!(ReplyStatus::Success));
    Value::Object(body)
}

pub fn error(message: impl Into<String>) -> Value {
    json!({"status": ReplyStatus::Error, "message": message.into()})
}

pub fn denied(reason: impl Into<String>) -> Value {
    json!({"status": ReplyStatus::Denied, "reason": reason.into()})
}

/// Reply for an action the agent does not handle.
pub fn unsupported(action: &str) -> Value {
    error(format!("Unknown action: {}", action))
}

/// Reply for a failed `check_permission`.
pub fn permission_denied(permission: &str) -> Value {
    denied(format!("Permission denied: {}", permission))
}

/// Read the status of a reply, if it has one.
pub fn status_of(reply: &Value) -> Option<ReplyStatus> {
    serde_json::from_value(reply.get("status")?.clone()).ok()
}

pub fn is_success(reply: &Value) -> bool {
    status_of(reply) == Some(ReplyStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_merges_fields() {
        let reply = success(json!({"patient_id": "P001"}));
        assert_eq!(reply, json!({"status": "success", "patient_id": "P001"}));
        assert!(is_success(&reply));
    }

    #[test]
    fn test_success_wraps_scalars() {
        assert_eq!(success(json!(3)), json!({"status": "success", "result": 3}));
        assert_eq!(success(Value::Null), json!({"status": "success"}));
    }

    #[test]
    fn test_error_shapes() {
        assert_eq!(
            unsupported("dance"),
            json!({"status": "error", "message": "Unknown action: dance"})
        );
        assert_eq!(status_of(&permission_denied("write_record")), Some(ReplyStatus::Denied));
        assert_eq!(status_of(&json!({"status": "scheduled"})), None);
        assert_eq!(status_of(&json!(1)), None);
    }
}
