//! R-tree backed radius queries over stations.
//!
//! ## Two-Stage Filtering
//!
//! 1. **R-tree filter**: a lon/lat envelope sized to over-cover the radius
//! 2. **Haversine filter**: exact great-circle distance on the candidates
//!
//! Ranking is shared with [`within_radius_linear`], the linear-scan reference,
//! so both paths return identical ordering for the same query.

use std::sync::Arc;

use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

use crate::identifiers::StationId;
use crate::provider::static_provider::Station;
use crate::spatial::queries::{haversine_km, search_envelope};

// ============================================================================
// Station Spatial Node
// ============================================================================

#[derive(Clone)]
pub struct StationNode {
    pub station: Arc<Station>,
    point: [f64; 2],
}

impl StationNode {
    pub fn new(station: Arc<Station>) -> Self {
        let location = station.location();
        Self {
            station,
            point: [location.x(), location.y()],
        }
    }
}

impl RTreeObject for StationNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Stations within `radius_km` of `point`, nearest first.
#[derive(Clone, Debug)]
pub struct NearbyQuery {
    pub point: Point,
    pub radius_km: f64,
    /// Origin station to leave out of the results
    pub exclude: Option<StationId>,
    pub limit: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct NearbyStation {
    pub station: Arc<Station>,
    pub distance_km: f64,
}

pub struct StationIndex {
    tree: RTree<StationNode>,
}

impl StationIndex {
    pub fn new(stations: &[Arc<Station>]) -> Self {
        let nodes = stations.iter().cloned().map(StationNode::new).collect();
        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    pub fn within_radius(&self, query: &NearbyQuery) -> Vec<NearbyStation> {
        if !is_valid_radius(query.radius_km) {
            return Vec::new();
        }

        let envelope = search_envelope(query.point, query.radius_km);
        rank(
            self.tree
                .locate_in_envelope(&envelope)
                .map(|node| &node.station),
            query,
        )
    }
}

/// Linear-scan reference for [`StationIndex::within_radius`].
pub fn within_radius_linear<'a>(
    stations: impl IntoIterator<Item = &'a Arc<Station>>,
    query: &NearbyQuery,
) -> Vec<NearbyStation> {
    if !is_valid_radius(query.radius_km) {
        return Vec::new();
    }
    rank(stations.into_iter(), query)
}

fn is_valid_radius(radius_km: f64) -> bool {
    radius_km > 0.0 && radius_km.is_finite()
}

fn rank<'a>(
    candidates: impl Iterator<Item = &'a Arc<Station>>,
    query: &NearbyQuery,
) -> Vec<NearbyStation> {
    let mut hits: Vec<NearbyStation> = candidates
        .filter(|station| query.exclude.as_ref() != Some(&station.id))
        .filter_map(|station| {
            let distance_km = haversine_km(query.point, station.location());
            (distance_km <= query.radius_km).then(|| NearbyStation {
                station: station.clone(),
                distance_km,
            })
        })
        .collect();

    // Ties on distance fall back to station ID so both query paths agree.
    hits.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.station.id.cmp(&b.station.id))
    });
    hits.truncate(query.limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::static_provider::tests::fixture_store;

    fn query(lat: f64, lon: f64, radius_km: f64) -> NearbyQuery {
        NearbyQuery {
            point: Point::new(lon, lat),
            radius_km,
            exclude: None,
            limit: usize::MAX,
        }
    }

    fn ids(hits: &[NearbyStation]) -> Vec<&str> {
        hits.iter().map(|hit| hit.station.id.as_str()).collect()
    }

    #[test]
    fn test_nearest_first_with_origin_excluded() {
        let store = fixture_store();
        let mut q = query(40.7589, -73.9857, 0.5);
        q.exclude = Some(StationId::new("127"));
        q.limit = 2;

        let hits = store.index().within_radius(&q);
        assert!(hits.len() <= 2);
        assert!(hits.iter().all(|hit| hit.station.id.as_str() != "127"));
        assert!(hits.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        assert!(hits.iter().all(|hit| hit.distance_km <= 0.5));
    }

    #[test]
    fn test_index_matches_linear_scan() {
        let store = fixture_store();
        let centers = [
            (40.7589, -73.9857),
            (40.7505, -73.9935),
            (40.6837, -73.9788),
            (40.7506, -73.9402),
        ];

        for (lat, lon) in centers {
            for radius_km in [0.25, 0.5, 1.0, 2.5, 5.0, 30.0] {
                let q = query(lat, lon, radius_km);
                let indexed = store.index().within_radius(&q);
                let linear = within_radius_linear(store.all_stations(), &q);
                assert_eq!(ids(&indexed), ids(&linear), "radius {radius_km} at ({lat}, {lon})");
            }
        }
    }

    #[test]
    fn test_radius_inclusion_is_monotonic() {
        let store = fixture_store();
        let radii = [0.1, 0.5, 1.0, 3.0, 10.0, 40.0];

        for pair in radii.windows(2) {
            let small = store.index().within_radius(&query(40.7589, -73.9857, pair[0]));
            let large = store.index().within_radius(&query(40.7589, -73.9857, pair[1]));
            let large_ids = ids(&large);
            assert!(ids(&small).iter().all(|id| large_ids.contains(id)));
        }
    }

    #[test]
    fn test_invalid_radius_returns_nothing() {
        let store = fixture_store();
        for radius_km in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(store.index().within_radius(&query(40.7589, -73.9857, radius_km)).is_empty());
            assert!(within_radius_linear(store.all_stations(), &query(40.7589, -73.9857, radius_km)).is_empty());
        }
    }
}
