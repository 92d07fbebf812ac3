//! In-memory reference store loaded from the subway station and line dataset.
//!
//! Stations and lines are loaded once, validated, and indexed. Nothing is
//! mutated afterwards, so a single `Arc<StaticReferenceStore>` is shared by
//! every request without locking.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::identifiers::*;
use crate::models::types::{Amenities, Borough, LoadError};
use crate::spatial::index::{NearbyQuery, NearbyStation, StationIndex};

/// Sanity box around the five boroughs, (min, max) in degrees.
pub const SERVICE_AREA_LAT: (f64, f64) = (40.40, 41.00);
pub const SERVICE_AREA_LON: (f64, f64) = (-74.30, -73.60);

// ============================================================================
// Records
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub slug: String,
    pub name: String,
    pub borough: Borough,
    pub latitude: f64,
    pub longitude: f64,
    pub lines: BTreeSet<LineCode>,
    /// Platform stop IDs, e.g. `127N` and `127S`
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub amenities: Amenities,
}

impl Station {
    pub fn location(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Line {
    pub code: LineCode,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub terminals: Vec<StationId>,
    /// Stations in running order
    pub stations: Vec<StationId>,
    /// Upstream route IDs published for this line; defaults to the line code
    #[serde(default)]
    pub feed_route_ids: Vec<String>,
}

#[derive(Deserialize)]
struct Dataset {
    stations: Vec<Station>,
    lines: Vec<Line>,
}

// ============================================================================
// Store
// ============================================================================

pub struct StaticReferenceStore {
    // Core data
    stations: Vec<Arc<Station>>,
    lines: Vec<Arc<Line>>,

    // Lookup maps
    station_map: HashMap<StationId, Arc<Station>>,
    slug_map: HashMap<String, Arc<Station>>,
    line_map: HashMap<LineCode, Arc<Line>>,
    line_stations: HashMap<LineCode, Vec<Arc<Station>>>,
    route_map: HashMap<String, LineCode>,
    stop_map: HashMap<String, Arc<Station>>,

    // Spatial index
    station_index: StationIndex,
}

impl StaticReferenceStore {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LoadError> {
        let dataset: Dataset = serde_json::from_str(raw)?;
        Self::from_records(dataset.stations, dataset.lines)
    }

    /// Validate and index raw records.
    ///
    /// Fails on the first integrity violation; a store is never built from
    /// partially valid data.
    pub fn from_records(stations: Vec<Station>, lines: Vec<Line>) -> Result<Self, LoadError> {
        let mut station_map = HashMap::with_capacity(stations.len());
        let mut slug_map = HashMap::with_capacity(stations.len());
        let mut stop_map: HashMap<String, Arc<Station>> = HashMap::new();

        let stations: Vec<Arc<Station>> = stations.into_iter().map(Arc::new).collect();
        for station in &stations {
            validate_station(station)?;

            if station_map.insert(station.id.clone(), station.clone()).is_some() {
                return Err(LoadError::DuplicateStation(station.id.clone()));
            }
            if slug_map.insert(station.slug.clone(), station.clone()).is_some() {
                return Err(LoadError::DuplicateSlug(station.slug.clone()));
            }

            let parents = std::iter::once(station.id.as_str())
                .chain(station.platforms.iter().map(|p| parent_stop_id(p)));
            for stop in parents {
                match stop_map.get(stop) {
                    Some(owner) if owner.id != station.id => {
                        return Err(LoadError::DuplicatePlatform(stop.to_string()));
                    }
                    Some(_) => {}
                    None => {
                        stop_map.insert(stop.to_string(), station.clone());
                    }
                }
            }
        }

        // IDs are tried before slugs, so a slug shadowing another station's ID
        // would make that station unreachable by slug.
        for station in &stations {
            if let Some(other) = station_map.get(station.slug.as_str()) {
                if other.id != station.id {
                    return Err(LoadError::AmbiguousKey {
                        station: station.id.clone(),
                        other: other.id.clone(),
                    });
                }
            }
        }

        let mut line_map = HashMap::with_capacity(lines.len());
        let mut line_stations = HashMap::with_capacity(lines.len());
        let mut route_map: HashMap<String, LineCode> = HashMap::new();

        let mut normalized = Vec::with_capacity(lines.len());
        for mut line in lines {
            if line.feed_route_ids.is_empty() {
                line.feed_route_ids.push(line.code.to_string());
            }
            normalized.push(Arc::new(line));
        }

        for line in &normalized {
            if line_map.insert(line.code.clone(), line.clone()).is_some() {
                return Err(LoadError::DuplicateLine(line.code.clone()));
            }

            let mut ordered = Vec::with_capacity(line.stations.len());
            for station_id in line.stations.iter().chain(&line.terminals) {
                if !station_map.contains_key(station_id) {
                    return Err(LoadError::UnknownStation {
                        line: line.code.clone(),
                        station: station_id.clone(),
                    });
                }
            }
            for station_id in &line.stations {
                ordered.push(station_map[station_id].clone());
            }
            line_stations.insert(line.code.clone(), ordered);

            for route in &line.feed_route_ids {
                if let Some(first) = route_map.insert(route.clone(), line.code.clone()) {
                    return Err(LoadError::DuplicateRoute {
                        route: route.clone(),
                        first,
                        second: line.code.clone(),
                    });
                }
            }
        }

        for station in &stations {
            if let Some(line) = station.lines.iter().find(|code| !line_map.contains_key(*code)) {
                return Err(LoadError::UnknownLine {
                    station: station.id.clone(),
                    line: line.clone(),
                });
            }
        }

        let station_index = StationIndex::new(&stations);

        tracing::info!(
            stations = stations.len(),
            lines = normalized.len(),
            "loaded static reference data"
        );

        Ok(Self {
            stations,
            lines: normalized,
            station_map,
            slug_map,
            line_map,
            line_stations,
            route_map,
            stop_map,
            station_index,
        })
    }

    // ---- Lookups ----

    pub fn station_by_id(&self, id: &str) -> Option<&Arc<Station>> {
        self.station_map.get(id)
    }

    pub fn station_by_slug(&self, slug: &str) -> Option<&Arc<Station>> {
        self.slug_map.get(slug)
    }

    /// Look up by station ID first, then by slug.
    pub fn resolve_station(&self, id_or_slug: &str) -> Option<&Arc<Station>> {
        self.station_by_id(id_or_slug)
            .or_else(|| self.station_by_slug(id_or_slug))
    }

    /// Station owning an upstream stop ID, with or without its platform
    /// direction suffix (`127`, `127N`, `725S` all resolve to Times Sq).
    pub fn station_for_stop(&self, stop_id: &str) -> Option<&Arc<Station>> {
        self.stop_map.get(parent_stop_id(stop_id))
    }

    pub fn line(&self, code: &str) -> Option<&Arc<Line>> {
        self.line_map.get(code)
    }

    /// Stations served by a line in running order; `None` for unknown lines.
    pub fn stations_by_line(&self, code: &str) -> Option<&[Arc<Station>]> {
        self.line_stations.get(code).map(Vec::as_slice)
    }

    /// Map an upstream route ID (e.g. `GS`, `7X`) to its line.
    pub fn line_for_route(&self, route_id: &str) -> Option<&LineCode> {
        self.route_map.get(route_id)
    }

    // ---- Collections ----

    pub fn all_stations(&self) -> &[Arc<Station>] {
        &self.stations
    }

    pub fn all_lines(&self) -> &[Arc<Line>] {
        &self.lines
    }

    /// Codes from `lines` that this dataset does not define, deduplicated.
    pub fn missing_lines<'a>(&self, lines: impl IntoIterator<Item = &'a LineCode>) -> BTreeSet<&'a LineCode> {
        lines
            .into_iter()
            .filter(|code| !self.line_map.contains_key(code.as_str()))
            .collect()
    }

    // ---- Spatial queries ----

    pub fn index(&self) -> &StationIndex {
        &self.station_index
    }

    pub fn nearest_stations(&self, query: &NearbyQuery) -> Vec<NearbyStation> {
        self.station_index.within_radius(query)
    }
}

/// Strip a trailing `N`/`S` platform direction from a stop ID.
pub fn parent_stop_id(stop_id: &str) -> &str {
    match split_platform_suffix(stop_id) {
        Some((parent, _)) => parent,
        None => stop_id,
    }
}

/// Split `127N` into (`127`, `N`). Bare IDs and one-character IDs yield `None`.
pub fn split_platform_suffix(stop_id: &str) -> Option<(&str, char)> {
    let suffix = stop_id.chars().last()?;
    if stop_id.len() > 1 && matches!(suffix, 'N' | 'S') {
        Some((&stop_id[..stop_id.len() - 1], suffix))
    } else {
        None
    }
}

fn validate_station(station: &Station) -> Result<(), LoadError> {
    if station.lines.is_empty() {
        return Err(LoadError::NoLines(station.id.clone()));
    }

    let lat_ok = (SERVICE_AREA_LAT.0..=SERVICE_AREA_LAT.1).contains(&station.latitude);
    let lon_ok = (SERVICE_AREA_LON.0..=SERVICE_AREA_LON.1).contains(&station.longitude);
    if !lat_ok || !lon_ok {
        return Err(LoadError::OutOfBounds {
            station: station.id.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SAMPLE_DATASET: &str = include_str!("../../fixtures/subway-sample.json");

    /// Manhattan-centred sample of the network; not a complete dataset.
    pub(crate) fn fixture_store() -> StaticReferenceStore {
        StaticReferenceStore::from_json_str(SAMPLE_DATASET).unwrap()
    }

    fn station(id: &str, slug: &str, lines: &[&str]) -> Station {
        Station {
            id: StationId::new(id),
            slug: slug.into(),
            name: format!("Station {id}"),
            borough: Borough::Manhattan,
            latitude: 40.75,
            longitude: -73.98,
            lines: lines.iter().copied().map(LineCode::from).collect(),
            platforms: vec![format!("{id}N"), format!("{id}S")],
            amenities: Amenities::default(),
        }
    }

    fn line(code: &str, stations: &[&str]) -> Line {
        Line {
            code: LineCode::new(code),
            name: format!("{code} Line"),
            color: None,
            text_color: None,
            terminals: vec![],
            stations: stations.iter().copied().map(StationId::from).collect(),
            feed_route_ids: vec![],
        }
    }

    #[test]
    fn test_id_and_slug_resolve_to_same_station() {
        let store = fixture_store();
        for station in store.all_stations() {
            let by_id = store.resolve_station(station.id.as_str()).unwrap();
            let by_slug = store.resolve_station(&station.slug).unwrap();
            assert!(Arc::ptr_eq(by_id, by_slug));
        }
    }

    #[test]
    fn test_times_square_lookup() {
        let store = fixture_store();
        let by_id = store.station_by_id("127").unwrap();
        let by_slug = store.station_by_slug("times-sq-42-st").unwrap();
        assert!(Arc::ptr_eq(by_id, by_slug));

        let lines: Vec<&str> = by_id.lines.iter().map(LineCode::as_str).collect();
        assert_eq!(lines, vec!["1", "2", "3", "7", "N", "Q", "R", "S", "W"]);
    }

    #[test]
    fn test_stations_by_line_keeps_running_order() {
        let store = fixture_store();
        let line = store.line("1").unwrap();
        let stations = store.stations_by_line("1").unwrap();

        let ids: Vec<&StationId> = stations.iter().map(|s| &s.id).collect();
        let expected: Vec<&StationId> = line.stations.iter().collect();
        assert_eq!(ids, expected);
        assert!(store.stations_by_line("Z").is_none());
        assert!(store.line("Z").is_none());
    }

    #[test]
    fn test_platform_stops_resolve_to_complex() {
        let store = fixture_store();
        for stop in ["127", "127N", "725S", "R16N", "902S"] {
            assert_eq!(store.station_for_stop(stop).unwrap().id.as_str(), "127", "{stop}");
        }
        assert_eq!(store.station_for_stop("901N").unwrap().id.as_str(), "631");
        assert!(store.station_for_stop("A27N").is_none());
    }

    #[test]
    fn test_split_platform_suffix() {
        assert_eq!(split_platform_suffix("127N"), Some(("127", 'N')));
        assert_eq!(split_platform_suffix("R31S"), Some(("R31", 'S')));
        assert_eq!(split_platform_suffix("127"), None);
        assert_eq!(split_platform_suffix("S"), None);
        assert_eq!(parent_stop_id("S31S"), "S31");
    }

    #[test]
    fn test_platform_claimed_twice_is_fatal() {
        let mut first = station("101", "a", &["1"]);
        first.platforms = vec!["725N".into()];
        let mut second = station("102", "b", &["1"]);
        second.platforms = vec!["725S".into()];

        let result = StaticReferenceStore::from_records(vec![first, second], vec![line("1", &["101", "102"])]);
        assert!(matches!(result, Err(LoadError::DuplicatePlatform(_))));
    }

    #[test]
    fn test_route_aliases() {
        let store = fixture_store();
        assert_eq!(store.line_for_route("GS").map(LineCode::as_str), Some("S"));
        assert_eq!(store.line_for_route("7X").map(LineCode::as_str), Some("7"));
        assert_eq!(store.line_for_route("1").map(LineCode::as_str), Some("1"));
        assert!(store.line_for_route("FS").is_none());
    }

    #[test]
    fn test_unknown_station_reference_is_fatal() {
        let result = StaticReferenceStore::from_records(
            vec![station("101", "a", &["1"])],
            vec![line("1", &["101", "999"])],
        );
        assert!(matches!(result, Err(LoadError::UnknownStation { .. })));
    }

    #[test]
    fn test_unknown_terminal_is_fatal() {
        let mut one = line("1", &["101"]);
        one.terminals = vec![StationId::new("142")];
        let result = StaticReferenceStore::from_records(vec![station("101", "a", &["1"])], vec![one]);
        assert!(matches!(result, Err(LoadError::UnknownStation { .. })));
    }

    #[test]
    fn test_out_of_bounds_coordinate_is_fatal() {
        let mut boston = station("101", "a", &["1"]);
        boston.latitude = 42.36;
        boston.longitude = -71.06;

        let result = StaticReferenceStore::from_records(vec![boston], vec![line("1", &["101"])]);
        assert!(matches!(result, Err(LoadError::OutOfBounds { .. })));
    }

    #[test]
    fn test_station_without_lines_is_fatal() {
        let result = StaticReferenceStore::from_records(vec![station("101", "a", &[])], vec![]);
        assert!(matches!(result, Err(LoadError::NoLines(_))));
    }

    #[test]
    fn test_slug_colliding_with_other_id_is_fatal() {
        let result = StaticReferenceStore::from_records(
            vec![station("101", "102", &["1"]), station("102", "b", &["1"])],
            vec![line("1", &["101", "102"])],
        );
        assert!(matches!(result, Err(LoadError::AmbiguousKey { .. })));
    }

    #[test]
    fn test_slug_equal_to_own_id_is_allowed() {
        let store = StaticReferenceStore::from_records(
            vec![station("101", "101", &["1"])],
            vec![line("1", &["101"])],
        )
        .unwrap();
        assert!(store.resolve_station("101").is_some());
    }

    #[test]
    fn test_duplicates_are_fatal() {
        let result = StaticReferenceStore::from_records(
            vec![station("101", "a", &["1"]), station("101", "b", &["1"])],
            vec![line("1", &["101"])],
        );
        assert!(matches!(result, Err(LoadError::DuplicateStation(_))));

        let result = StaticReferenceStore::from_records(
            vec![station("101", "a", &["1"]), station("102", "a", &["1"])],
            vec![line("1", &["101"])],
        );
        assert!(matches!(result, Err(LoadError::DuplicateSlug(_))));

        let mut express = line("1X", &["101"]);
        express.feed_route_ids = vec!["1".into()];
        let result = StaticReferenceStore::from_records(
            vec![station("101", "a", &["1"])],
            vec![line("1", &["101"]), express],
        );
        assert!(matches!(result, Err(LoadError::DuplicateRoute { .. })));
    }

    #[test]
    fn test_station_referencing_unknown_line_is_fatal() {
        let result = StaticReferenceStore::from_records(
            vec![station("101", "a", &["1", "9"])],
            vec![line("1", &["101"])],
        );
        assert!(matches!(result, Err(LoadError::UnknownLine { .. })));
    }

    #[test]
    fn test_sample_dataset_reports_lines_it_lacks() {
        let store = fixture_store();
        let registry = crate::config::FeedRegistry::mta(crate::config::MTA_FEED_BASE_URL);

        let missing: Vec<&str> = store.missing_lines(registry.lines()).into_iter().map(LineCode::as_str).collect();
        assert!(missing.contains(&"A"));
        assert!(missing.contains(&"L"));
        assert!(!missing.contains(&"N"));
        assert!(!missing.contains(&"S"));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = StaticReferenceStore::from_json_str("{\"stations\": [}");
        assert!(matches!(result, Err(LoadError::Parse(_))));
    }
}
