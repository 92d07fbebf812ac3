//! # subway-transit
//!
//! Realtime arrivals, service alerts and nearby-station search for the
//! subway, layered over an immutable static dataset.
//!
//! ## Features
//!
//! - **Static reference store**: stations, lines and platform stop IDs loaded
//!   once and integrity-checked at startup
//! - **Tolerant feed decoding**: GTFS-RT payloads decoded entity by entity,
//!   malformed entries skipped and counted
//! - **Partial degradation**: a failing feed group marks its lines unavailable
//!   while the rest of the response is still served
//! - **Spatial queries**: R-tree prefiltered haversine radius search
//! - **Pluggable networking**: implement [`network::FeedSource`] to supply
//!   payloads from anywhere
//!
//! ## Example
//!
//! ```
//! use subway_transit::prelude::*;
//! use geo::Point;
//!
//! let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/subway-sample.json");
//! let store = StaticReferenceStore::from_path(path).unwrap();
//!
//! let times_sq = store.resolve_station("times-sq-42-st").unwrap();
//! assert_eq!(times_sq.id.as_str(), "127");
//!
//! let nearby = store.nearest_stations(&NearbyQuery {
//!     point: Point::new(-73.9857, 40.7589),
//!     radius_km: 0.5,
//!     exclude: Some(times_sq.id.clone()),
//!     limit: 5,
//! });
//! assert!(nearby.iter().all(|hit| hit.distance_km <= 0.5));
//! ```

pub mod alerts;
pub mod arrivals;
pub mod cache;
pub mod config;
pub mod facade;
pub mod feed;
pub mod identifiers;
pub mod models;
pub mod network;
pub mod provider;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::alerts::{AlertReport, LineServiceStatus, LineStatus, ServiceAlert};
    pub use crate::arrivals::{FeedAvailability, LineFeedStatus, TrainArrival};
    pub use crate::config::{AggregationPolicy, ArrivalPolicy, FeedGroup, FeedRegistry, MTA_FEED_BASE_URL};
    pub use crate::facade::{
        LineDetailResponse, NearbyStationsResponse, StationArrivalsResponse, TransitContext,
    };
    pub use crate::identifiers::*;
    pub use crate::models::types::{
        AlertCategory, Amenities, Borough, Direction, FeedError, LoadError, TransitError,
    };
    pub use crate::network::{FeedSource, HttpFeedSource};
    pub use crate::provider::{Line, Station, StaticReferenceStore};
    pub use crate::spatial::{NearbyQuery, NearbyStation};
}

pub use prelude::*;
