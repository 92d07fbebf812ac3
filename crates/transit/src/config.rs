//! Feed group registry and aggregation policy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::identifiers::{FeedGroupId, LineCode};

/// Production endpoint for the agency's realtime feeds.
pub const MTA_FEED_BASE_URL: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    TripUpdates,
    Alerts,
}

/// One upstream realtime source covering one or more lines.
#[derive(Clone, Debug)]
pub struct FeedGroup {
    pub id: FeedGroupId,
    pub url: String,
    pub lines: Vec<LineCode>,
    pub kind: FeedKind,
}

impl FeedGroup {
    pub fn trip_updates(id: &str, url: impl Into<String>, lines: &[&str]) -> Self {
        Self {
            id: FeedGroupId::new(id),
            url: url.into(),
            lines: lines.iter().copied().map(LineCode::from).collect(),
            kind: FeedKind::TripUpdates,
        }
    }

    pub fn alerts(id: &str, url: impl Into<String>) -> Self {
        Self {
            id: FeedGroupId::new(id),
            url: url.into(),
            lines: Vec::new(),
            kind: FeedKind::Alerts,
        }
    }

    pub fn covers(&self, line: &LineCode) -> bool {
        self.kind == FeedKind::TripUpdates && self.lines.contains(line)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeedRegistry {
    groups: Vec<Arc<FeedGroup>>,
}

impl FeedRegistry {
    pub fn new(groups: Vec<FeedGroup>) -> Self {
        Self {
            groups: groups.into_iter().map(Arc::new).collect(),
        }
    }

    /// The agency's published feed split, rooted at `base_url`.
    pub fn mta(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let url = |path: &str| format!("{base}/{path}");

        Self::new(vec![
            FeedGroup::trip_updates("gtfs", url("nyct%2Fgtfs"), &["1", "2", "3", "4", "5", "6", "7", "S"]),
            FeedGroup::trip_updates("gtfs-ace", url("nyct%2Fgtfs-ace"), &["A", "C", "E", "H"]),
            FeedGroup::trip_updates("gtfs-bdfm", url("nyct%2Fgtfs-bdfm"), &["B", "D", "F", "M", "FS"]),
            FeedGroup::trip_updates("gtfs-g", url("nyct%2Fgtfs-g"), &["G"]),
            FeedGroup::trip_updates("gtfs-jz", url("nyct%2Fgtfs-jz"), &["J", "Z"]),
            FeedGroup::trip_updates("gtfs-nqrw", url("nyct%2Fgtfs-nqrw"), &["N", "Q", "R", "W"]),
            FeedGroup::trip_updates("gtfs-l", url("nyct%2Fgtfs-l"), &["L"]),
            FeedGroup::trip_updates("gtfs-si", url("nyct%2Fgtfs-si"), &["SI"]),
            FeedGroup::alerts("subway-alerts", url("camsys%2Fsubway-alerts")),
        ])
    }

    pub fn groups(&self) -> &[Arc<FeedGroup>] {
        &self.groups
    }

    /// Trip-update groups covering any of `lines`, each once, in registry order.
    pub fn groups_for_lines<'a>(&self, lines: impl IntoIterator<Item = &'a LineCode>) -> Vec<Arc<FeedGroup>> {
        let lines: HashSet<&LineCode> = lines.into_iter().collect();
        self.groups
            .iter()
            .filter(|group| group.lines.iter().any(|line| lines.contains(line)))
            .filter(|group| group.kind == FeedKind::TripUpdates)
            .cloned()
            .collect()
    }

    /// Every line some trip-update group covers, in registry order.
    pub fn lines(&self) -> impl Iterator<Item = &LineCode> {
        self.groups
            .iter()
            .filter(|group| group.kind == FeedKind::TripUpdates)
            .flat_map(|group| group.lines.iter())
    }

    pub fn alerts_group(&self) -> Option<&Arc<FeedGroup>> {
        self.groups.iter().find(|group| group.kind == FeedKind::Alerts)
    }
}

/// Per-line trimming applied after arrivals are merged and sorted.
#[derive(Clone, Debug, Default)]
pub struct ArrivalPolicy {
    pub max_per_line: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct AggregationPolicy {
    /// How long a decoded snapshot is reused across requests
    pub cache_ttl: Duration,
    /// Ceiling for a single feed group's fetch and decode
    pub fetch_timeout: Duration,
    /// Ceiling for all fan-out work in one request
    pub request_deadline: Duration,
    pub nearby_limit: usize,
    pub nearby_radius_km: f64,
    pub arrivals: ArrivalPolicy,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(20),
            fetch_timeout: Duration::from_secs(3),
            request_deadline: Duration::from_secs(4),
            nearby_limit: 8,
            nearby_radius_km: 0.5,
            arrivals: ArrivalPolicy::default(),
        }
    }
}
