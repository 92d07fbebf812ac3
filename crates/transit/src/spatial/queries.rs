//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula for accurate distances on Earth's surface.

use geo::{HaversineDistance, Point};
use rstar::AABB;

/// Kilometres per degree of latitude, rounded down so envelopes over-cover.
const KM_PER_DEGREE_LAT: f64 = 110.0;

/// Kilometres per degree of longitude at the equator, rounded down likewise.
const KM_PER_DEGREE_LON: f64 = 111.0;

/// Slack applied to envelopes; great-circle paths bow away from parallels.
const ENVELOPE_MARGIN: f64 = 1.1;

/// Calculate Haversine distance between two points in kilometres
pub fn haversine_km(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2) / 1000.0
}

/// Lon/lat box guaranteed to contain every point within `radius_km` of `center`.
///
/// Used as the R-tree prefilter; results are always refined with
/// [`haversine_km`] afterwards.
pub fn search_envelope(center: Point, radius_km: f64) -> AABB<[f64; 2]> {
    let dlat = radius_km / KM_PER_DEGREE_LAT * ENVELOPE_MARGIN;

    // Parallels shrink toward the pole, so size the box for its poleward edge.
    let poleward = (center.y().abs() + dlat).min(89.9);
    let dlon = radius_km / (KM_PER_DEGREE_LON * poleward.to_radians().cos()) * ENVELOPE_MARGIN;

    AABB::from_corners(
        [center.x() - dlon, center.y() - dlat],
        [center.x() + dlon, center.y() + dlat],
    )
}
