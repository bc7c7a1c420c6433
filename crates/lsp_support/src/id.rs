//! Strongly-typed identifiers for engine entities
//!
//! Type-safe IDs prevent mixing up different kinds of handles (a binding id
//! passed where a request id was expected, etc). Each ID wraps a UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate strongly-typed ID wrappers
macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random ID
            #[inline]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an ID from a UUID
            #[inline]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            #[inline]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Render as the hyphenated UUID string, e.g. for wire ids.
            #[inline]
            pub fn to_wire_string(&self) -> String {
                self.0.to_string()
            }

            /// Create a nil (zero) ID - useful for testing
            #[inline]
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Check if this is a nil ID
            #[inline]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    RequestId,
    "Unique identifier minted for each client-issued JSON-RPC request"
);
define_id!(SessionId, "Unique identifier for a client session");
define_id!(
    BindingId,
    "Unique identifier for a single server binding inside a pool"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_nil() {
        let id = RequestId::nil();
        assert!(id.is_nil());
        assert_eq!(id, RequestId::nil());
    }

    #[test]
    fn test_id_serialization() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_display() {
        let id = RequestId::new();
        let display = format!("{}", id);
        assert_eq!(display.len(), 8);
    }

    #[test]
    fn test_wire_string_is_full_uuid() {
        let id = RequestId::new();
        assert_eq!(id.to_wire_string().len(), 36);
    }

    #[test]
    fn test_different_id_types_are_distinct_types() {
        // RequestId and SessionId are not interchangeable - this is
        // enforced at compile time, not at runtime.
        let request = RequestId::new();
        let session = SessionId::new();
        assert_ne!(request.as_uuid(), session.as_uuid());
    }
}
