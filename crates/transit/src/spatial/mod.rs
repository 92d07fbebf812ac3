//! Spatial indexing and query utilities.

pub mod index;
pub mod queries;

pub use index::{NearbyQuery, NearbyStation, StationIndex};
pub use queries::haversine_km;
