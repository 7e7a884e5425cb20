//! Newtype identifiers shared across the data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
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

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

uuid_id!(ProjectId, "Identifies a Project.");
uuid_id!(SessionId, "Identifies a Session.");
uuid_id!(ThreadId, "Identifies a Thread.");
uuid_id!(EventId, "Identifies a single Event within a Thread's log.");
uuid_id!(CallId, "Identifies a tool call and its approval/result lineage.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ThreadId::new(), ThreadId::new());
    }

    #[test]
    fn display_matches_inner_string() {
        let id = SessionId::from("abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = CallId::from("call-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"call-1\"");
    }

    #[test]
    fn ids_usable_as_map_keys() {
        use std::collections::HashMap;
        let mut map: HashMap<ThreadId, u32> = HashMap::new();
        let id = ThreadId::new();
        map.insert(id.clone(), 1);
        assert_eq!(map.get(&id), Some(&1));
    }
}
