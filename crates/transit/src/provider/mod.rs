//! Static reference data.

pub mod static_provider;

pub use static_provider::{Line, Station, StaticReferenceStore};
