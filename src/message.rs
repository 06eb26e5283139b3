//! Message contract.
//!
//! A `Message` is one directed communication between two agents. Wire shape:
//!
//! ```text
//! { id?, from, to, action, data, timestamp?, reply_to? }
//! ```
//!
//! Messages are moved, never shared: every consuming operation in the queue
//! and orchestrator takes them by value, so each one is consumed exactly once.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageId, Result};
use crate::validation::{validate_non_empty, validate_present};

/// Action name used for synthesized replies.
pub const RESPONSE_ACTION: &str = "response";

/// One directed communication between a sender and a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Correlation id, generated when absent on the wire.
    #[serde(default)]
    pub id: MessageId,
    /// Sender identity.
    pub from: String,
    /// Recipient identity, resolved at dispatch time.
    pub to: String,
    /// Verb the recipient should perform.
    pub action: String,
    /// Arbitrary payload. `{}` is allowed, `null` is not.
    pub data: Value,
    /// RFC 3339 on the wire; an offset-less ISO-8601 value is read as UTC.
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    #[schemars(with = "DateTime<Utc>")]
    pub timestamp: DateTime<Utc>,
    /// Identity that receives the handler result as a `response` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        action: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            from: from.into(),
            to: to.into(),
            action: action.into(),
            data,
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    /// Set the reply target.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// A synthesized reply carrying a handler result.
    pub fn response(from: impl Into<String>, to: impl Into<String>, result: Value) -> Self {
        Self::new(from, to, RESPONSE_ACTION, result)
    }

    /// Build the reply for a dispatched message: from the original recipient
    /// to `reply_to`, carrying the handler result. `None` without a reply target.
    pub fn reply(&self, result: Value) -> Option<Message> {
        let reply_to = self.reply_to.as_ref()?;
        Some(Message::response(self.to.clone(), reply_to.clone(), result))
    }

    /// Check field presence. No payload schema is enforced.
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.from, "from")?;
        validate_non_empty(&self.to, "to")?;
        validate_non_empty(&self.action, "action")?;
        validate_present(&self.data, "data")?;
        if let Some(reply_to) = &self.reply_to {
            validate_non_empty(reply_to, "reply_to")?;
        }
        Ok(())
    }

    /// Parse a wire message and validate it.
    pub fn from_json(value: Value) -> Result<Self> {
        let message: Message = serde_json::from_value(value)?;
        message.validate()?;
        Ok(message)
    }

    /// Whether this message is a synthesized reply.
    pub fn is_response(&self) -> bool {
        self.action == RESPONSE_ACTION
    }
}

/// Lenient ISO-8601 timestamp parsing for inbound payloads.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    /// Parse RFC 3339, falling back to a naive date-time taken as UTC.
    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub(crate) fn deserialize_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}

/// JSON Schema of the message wire shape.
pub fn message_schema() -> Result<Value> {
    let schema = schemars::schema_for!(Message);
    Ok(serde_json::to_value(schema)?)
}
