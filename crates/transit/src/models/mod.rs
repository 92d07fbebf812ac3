//! Shared enums and error types.

pub mod types;

pub use types::{AlertCategory, Amenities, Borough, Direction, FeedError, LoadError, Result, TransitError};
