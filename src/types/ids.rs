//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `new()` (UUID v4), `from_string()`, `as_str()`,
/// Default, Display, Serialize, Deserialize, JsonSchema.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(MessageId);
define_id!(PatientId);
define_id!(RecordId);
define_id!(LabRequestId);
define_id!(AuditEntryId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_from_string_rejects_empty() {
        assert!(PatientId::from_string(String::new()).is_err());
        let id = PatientId::from_string("P001".to_string()).unwrap();
        assert_eq!(id.as_str(), "P001");
        assert_eq!(id.to_string(), "P001");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = RecordId::from_string("r-1".to_string()).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r-1\"");
    }
}
