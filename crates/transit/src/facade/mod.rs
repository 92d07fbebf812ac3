//! Request entry points combining static data with realtime feeds.
//!
//! [`TransitContext`] holds everything a request needs. Each operation
//! resolves static data first, so unknown stations and lines fail fast. Feed
//! work for one request runs concurrently under a shared deadline, and any
//! feed that fails or runs late becomes an "unavailable" marker in the
//! response instead of an error.

pub mod response;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use geo::Point;
use tokio::time::Instant;

use crate::alerts::{aggregate_alerts, AlertReport};
use crate::arrivals::{aggregate_arrivals, line_feed_statuses};
use crate::cache::{CachedFeed, SnapshotCache};
use crate::config::{AggregationPolicy, FeedGroup, FeedKind, FeedRegistry};
use crate::feed::{decode_feed, FeedSnapshot};
use crate::identifiers::LineCode;
use crate::models::types::{Borough, FeedError, Result, TransitError};
use crate::network::traits::FeedSource;
use crate::provider::static_provider::StaticReferenceStore;
use crate::spatial::index::NearbyQuery;

pub use response::{
    BoroughStations, LineDetailResponse, NearbyOrigin, NearbyStationsResponse, StationArrivalsResponse,
};

type Clock = fn() -> DateTime<Utc>;

type FeedOutcome = (Arc<FeedGroup>, CachedFeed);

pub struct TransitContext {
    store: Arc<StaticReferenceStore>,
    feeds: FeedRegistry,
    source: Arc<dyn FeedSource>,
    cache: SnapshotCache,
    policy: AggregationPolicy,
    clock: Clock,
}

impl TransitContext {
    pub fn new(
        store: Arc<StaticReferenceStore>,
        feeds: FeedRegistry,
        source: Arc<dyn FeedSource>,
        policy: AggregationPolicy,
    ) -> Self {
        Self {
            store,
            feeds,
            source,
            cache: SnapshotCache::new(policy.cache_ttl),
            policy,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for decode stamps and minutes-away.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &StaticReferenceStore {
        &self.store
    }

    pub fn policy(&self) -> &AggregationPolicy {
        &self.policy
    }

    // ---- Operations ----

    pub async fn station_arrivals(&self, id_or_slug: &str) -> Result<StationArrivalsResponse> {
        let station = self
            .store
            .resolve_station(id_or_slug)
            .ok_or_else(|| TransitError::StationNotFound(id_or_slug.to_string()))?
            .clone();

        let mut groups = self.feeds.groups_for_lines(&station.lines);
        groups.extend(self.feeds.alerts_group().cloned());

        let outcomes = self.fetch_all(&groups).await;
        let now = (self.clock)();

        let trip_snapshots = successful(&outcomes, FeedKind::TripUpdates);
        let arrivals = aggregate_arrivals(
            &self.store,
            trip_snapshots.iter().map(Arc::as_ref),
            &station,
            now,
            &self.policy.arrivals,
        );
        let feeds = line_feed_statuses(
            &station.lines,
            outcomes
                .iter()
                .map(|(group, result)| (Arc::as_ref(group), result.as_ref().map(Arc::as_ref))),
        );

        Ok(StationArrivalsResponse {
            arrivals,
            feeds,
            alerts: self.alert_report(&outcomes, &station.lines, now),
            skipped_entries: skipped_entries(&outcomes),
            generated_at: now.timestamp(),
            station,
        })
    }

    pub async fn line_detail(&self, code: &str) -> Result<LineDetailResponse> {
        let line = self
            .store
            .line(code)
            .ok_or_else(|| TransitError::LineNotFound(code.to_string()))?
            .clone();
        let stations = self.store.stations_by_line(code).unwrap_or_default();

        let boroughs = Borough::ALL
            .into_iter()
            .filter_map(|borough| {
                let members: Vec<_> = stations
                    .iter()
                    .filter(|station| station.borough == borough)
                    .cloned()
                    .collect();
                (!members.is_empty()).then(|| BoroughStations {
                    borough,
                    name: borough.display_name(),
                    stations: members,
                })
            })
            .collect();

        let groups: Vec<Arc<FeedGroup>> = self.feeds.alerts_group().cloned().into_iter().collect();
        let outcomes = self.fetch_all(&groups).await;
        let now = (self.clock)();
        let lines = BTreeSet::from([line.code.clone()]);

        Ok(LineDetailResponse {
            boroughs,
            alerts: self.alert_report(&outcomes, &lines, now),
            skipped_entries: skipped_entries(&outcomes),
            generated_at: now.timestamp(),
            line,
        })
    }

    /// Stations near another station, which is left out of the results.
    pub fn nearby_stations(
        &self,
        id_or_slug: &str,
        radius_km: Option<f64>,
        limit: Option<usize>,
    ) -> Result<NearbyStationsResponse> {
        let origin = self
            .store
            .resolve_station(id_or_slug)
            .ok_or_else(|| TransitError::StationNotFound(id_or_slug.to_string()))?
            .clone();

        let query = self.nearby_query(origin.location(), radius_km, limit)?;
        let query = NearbyQuery {
            exclude: Some(origin.id.clone()),
            ..query
        };

        Ok(NearbyStationsResponse {
            origin: NearbyOrigin {
                latitude: origin.latitude,
                longitude: origin.longitude,
                station: Some(origin),
            },
            radius_km: query.radius_km,
            stations: self.store.nearest_stations(&query),
            generated_at: (self.clock)().timestamp(),
        })
    }

    pub fn nearby_point(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: Option<f64>,
        limit: Option<usize>,
    ) -> Result<NearbyStationsResponse> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(TransitError::InvalidQuery(format!("latitude out of range: {latitude}")));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(TransitError::InvalidQuery(format!("longitude out of range: {longitude}")));
        }

        let query = self.nearby_query(Point::new(longitude, latitude), radius_km, limit)?;

        Ok(NearbyStationsResponse {
            origin: NearbyOrigin {
                station: None,
                latitude,
                longitude,
            },
            radius_km: query.radius_km,
            stations: self.store.nearest_stations(&query),
            generated_at: (self.clock)().timestamp(),
        })
    }

    fn nearby_query(&self, point: Point, radius_km: Option<f64>, limit: Option<usize>) -> Result<NearbyQuery> {
        let radius_km = radius_km.unwrap_or(self.policy.nearby_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(TransitError::InvalidQuery(format!("radius must be positive: {radius_km}")));
        }
        if limit == Some(0) {
            return Err(TransitError::InvalidQuery("limit must be at least 1".into()));
        }

        Ok(NearbyQuery {
            point,
            radius_km,
            exclude: None,
            // The configured cap bounds whatever the caller asks for.
            limit: limit.map_or(self.policy.nearby_limit, |n| n.min(self.policy.nearby_limit)),
        })
    }

    // ---- Feed fan-out ----

    /// Fetch every group concurrently, bounded by one request deadline.
    async fn fetch_all(&self, groups: &[Arc<FeedGroup>]) -> Vec<FeedOutcome> {
        let deadline = Instant::now() + self.policy.request_deadline;
        join_all(groups.iter().map(|group| self.fetch_group(group.clone(), deadline))).await
    }

    async fn fetch_group(&self, group: Arc<FeedGroup>, deadline: Instant) -> FeedOutcome {
        let budget = self
            .policy
            .fetch_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let fetch = self.cache.get_or_fetch(&group.id, || self.load(&group));
        let result = match tokio::time::timeout(budget, fetch).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(budget)),
        };

        if let Err(error) = &result {
            tracing::warn!(group = %group.id, %error, "feed unavailable");
        }
        (group, result)
    }

    async fn load(&self, group: &FeedGroup) -> CachedFeed {
        let payload = self.source.fetch(group).await?;
        let snapshot = decode_feed(&group.id, &payload, (self.clock)())?;
        tracing::debug!(
            group = %group.id,
            trips = snapshot.trip_updates.len(),
            alerts = snapshot.alerts.len(),
            "decoded feed"
        );
        Ok(Arc::new(snapshot))
    }

    /// Alerts from every snapshot, available only when the alerts group answered.
    fn alert_report(&self, outcomes: &[FeedOutcome], lines: &BTreeSet<LineCode>, now: DateTime<Utc>) -> AlertReport {
        let alerts_ok = outcomes
            .iter()
            .any(|(group, result)| group.kind == FeedKind::Alerts && result.is_ok());
        if !alerts_ok {
            return AlertReport::unavailable(lines);
        }

        let snapshots = outcomes
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok())
            .map(Arc::as_ref);
        aggregate_alerts(&self.store, snapshots, lines, now)
    }
}

fn successful(outcomes: &[FeedOutcome], kind: FeedKind) -> Vec<Arc<FeedSnapshot>> {
    outcomes
        .iter()
        .filter(|(group, _)| group.kind == kind)
        .filter_map(|(_, result)| result.as_ref().ok().cloned())
        .collect()
}

fn skipped_entries(outcomes: &[FeedOutcome]) -> usize {
    outcomes
        .iter()
        .filter_map(|(_, result)| result.as_ref().ok())
        .map(|snapshot| snapshot.skipped_entries)
        .sum()
}
