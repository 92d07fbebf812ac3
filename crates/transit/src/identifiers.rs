//! Type-safe, cheaply cloned identifiers for transit entities.
//!
//! All identifiers use Arc<str> so that records, indices and per-request
//! results can share the same allocation.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        // Lets maps keyed by the identifier be queried with a plain &str.
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer).map(Self::from)
            }
        }
    };
}

impl_identifier!(StationId);
impl_identifier!(LineCode);
impl_identifier!(TripId);
impl_identifier!(FeedGroupId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_equality() {
        let id1 = StationId::new("127");
        let id2 = StationId::new("127");
        let id3 = id1.clone();

        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
        assert!(Arc::ptr_eq(&id1.0, &id3.0)); // Clone shares Arc
    }

    #[test]
    fn test_identifier_lookup_by_str() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(LineCode::new("N"), 42);

        assert_eq!(map.get("N"), Some(&42));
        assert_eq!(map.get(&LineCode::new("N")), Some(&42));
    }

    #[test]
    fn test_line_codes_sort_lexically() {
        let mut codes: Vec<LineCode> = ["W", "1", "N", "7", "A"].into_iter().map(LineCode::from).collect();
        codes.sort();
        let sorted: Vec<&str> = codes.iter().map(LineCode::as_str).collect();
        assert_eq!(sorted, vec!["1", "7", "A", "N", "W"]);
    }

    #[test]
    fn test_identifier_serializes_as_string() {
        let json = serde_json::to_string(&FeedGroupId::new("gtfs-nqrw")).unwrap();
        assert_eq!(json, "\"gtfs-nqrw\"");

        let back: FeedGroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "gtfs-nqrw");
    }
}
