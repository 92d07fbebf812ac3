//! Core data types and enums for subway data.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// The five boroughs, in the order line listings group them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Borough {
    Manhattan,
    Bronx,
    Brooklyn,
    Queens,
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Manhattan,
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Bronx => "The Bronx",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::StatenIsland => "Staten Island",
        }
    }
}

/// Travel direction of a train relative to Manhattan's street grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Uptown,
    Downtown,
    Unknown,
}

impl Direction {
    /// Platform stop IDs carry a trailing `N` or `S` (e.g. `127N`).
    pub fn from_platform_suffix(suffix: char) -> Option<Self> {
        match suffix {
            'N' => Some(Self::Uptown),
            'S' => Some(Self::Downtown),
            _ => None,
        }
    }

    /// GTFS `direction_id`: 0 is northbound, 1 southbound for this agency.
    pub fn from_gtfs(direction_id: u32) -> Self {
        match direction_id {
            0 => Self::Uptown,
            1 => Self::Downtown,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Uptown => "uptown",
            Direction::Downtown => "downtown",
            Direction::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Severity of a service alert. Variant order is severity order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    GoodService,
    PlannedWork,
    Delay,
    ServiceChange,
    Suspended,
}

/// Station amenity flags. Missing flags in the dataset read as absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amenities {
    pub elevator: bool,
    pub escalator: bool,
    pub wifi: bool,
    pub restrooms: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Request-level errors surfaced to callers of the façade.
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Station not found: {0}")]
    StationNotFound(String),

    #[error("Line not found: {0}")]
    LineNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Static dataset failures. Any of these prevents startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Station {0} serves no lines")]
    NoLines(StationId),

    #[error("Station {station} at ({latitude}, {longitude}) is outside the service area")]
    OutOfBounds {
        station: StationId,
        latitude: f64,
        longitude: f64,
    },

    #[error("Duplicate station ID: {0}")]
    DuplicateStation(StationId),

    #[error("Duplicate station slug: {0}")]
    DuplicateSlug(String),

    #[error("Duplicate line code: {0}")]
    DuplicateLine(LineCode),

    #[error("Station {station} uses slug equal to station ID {other}")]
    AmbiguousKey { station: StationId, other: StationId },

    #[error("Line {line} references unknown station {station}")]
    UnknownStation { line: LineCode, station: StationId },

    #[error("Station {station} references unknown line {line}")]
    UnknownLine { station: StationId, line: LineCode },

    #[error("Platform stop {0} belongs to more than one station")]
    DuplicatePlatform(String),

    #[error("Route {route} is claimed by lines {first} and {second}")]
    DuplicateRoute {
        route: String,
        first: LineCode,
        second: LineCode,
    },
}

/// Total failure of one feed group for one aggregation pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Malformed feed envelope: {0}")]
    Envelope(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No feed group configured for {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_platform_suffix() {
        assert_eq!(Direction::from_platform_suffix('N'), Some(Direction::Uptown));
        assert_eq!(Direction::from_platform_suffix('S'), Some(Direction::Downtown));
        assert_eq!(Direction::from_platform_suffix('X'), None);
        assert_eq!(Direction::from_gtfs(1), Direction::Downtown);
        assert_eq!(Direction::from_gtfs(7), Direction::Unknown);
    }

    #[test]
    fn test_alert_category_severity_order() {
        assert!(AlertCategory::Suspended > AlertCategory::ServiceChange);
        assert!(AlertCategory::ServiceChange > AlertCategory::Delay);
        assert!(AlertCategory::Delay > AlertCategory::PlannedWork);
        assert!(AlertCategory::PlannedWork > AlertCategory::GoodService);
    }

    #[test]
    fn test_borough_serde_names() {
        let borough: Borough = serde_json::from_str("\"staten_island\"").unwrap();
        assert_eq!(borough, Borough::StatenIsland);
        assert_eq!(serde_json::to_string(&Borough::Bronx).unwrap(), "\"bronx\"");
    }

    #[test]
    fn test_amenities_default_missing_flags() {
        let amenities: Amenities = serde_json::from_str(r#"{"elevator": true}"#).unwrap();
        assert!(amenities.elevator);
        assert!(!amenities.wifi);
    }
}
