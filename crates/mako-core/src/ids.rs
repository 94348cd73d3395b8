//! Opaque string identifiers that travel on the wire unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a `String` newtype whose fresh values look like `<prefix>_<uuid v7>`.
/// Values received from a client or a model backend are kept verbatim.
macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident => $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
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
                f.write_str(&self.0)
            }
        }
    };
}

prefixed_id!(
    /// Identifies one client session.
    SessionId => "sess"
);
prefixed_id!(
    /// Identifies a tool call; backend-issued ids are used as-is.
    ToolCallId => "toolu"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("sess_"), "got: {id}");
    }

    #[test]
    fn tool_call_id_has_prefix() {
        let id = ToolCallId::new();
        assert!(id.as_str().starts_with("toolu_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_the_raw_string() {
        let id = SessionId::from_raw("sess_abc");
        assert_eq!(id.to_string(), "sess_abc");
        assert_eq!(format!("{id}"), id.as_str());
    }

    #[test]
    fn serde_is_transparent() {
        let id = ToolCallId::from_raw("stub-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""stub-1""#);
        let parsed: ToolCallId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn from_raw_preserves_backend_ids() {
        let id = ToolCallId::from_raw("call_function_abc123_1");
        assert_eq!(id.as_str(), "call_function_abc123_1");
    }
}
