//! Branded ID newtypes.
//!
//! Call identifiers are chosen by the caller's client and are opaque to the
//! server. Connection identifiers are generated here as UUID v7 strings so
//! log lines sort in connection order.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of one emergency call, supplied by the caller at initiation.
    CallId
}

branded_id! {
    /// Identifier of one connected duplex channel.
    ConnectionId
}

impl ConnectionId {
    /// Generate a fresh, time-ordered connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn call_id_roundtrips_through_string() {
        let id = CallId::from("call-42");
        assert_eq!(id.as_str(), "call-42");
        assert_eq!(String::from(id.clone()), "call-42");
        assert_eq!(id.to_string(), "call-42");
    }

    #[test]
    fn call_id_serializes_transparently() {
        let id = CallId::from("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: CallId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn call_id_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(CallId::from("x"), 1);
        assert_eq!(map.get("x"), Some(&1));
    }

    #[test]
    fn generated_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
