//! Per-station arrival boards merged from independent feed snapshots.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ArrivalPolicy, FeedGroup};
use crate::feed::{FeedSnapshot, TripUpdateRecord};
use crate::identifiers::{FeedGroupId, LineCode};
use crate::models::types::{Direction, FeedError};
use crate::provider::static_provider::{parent_stop_id, split_platform_suffix, Station, StaticReferenceStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrainArrival {
    pub line: LineCode,
    pub direction: Direction,
    pub destination: String,
    /// Whole minutes until arrival; a train already due reads 0
    pub minutes_away: u32,
    pub feed: FeedGroupId,
}

/// Whether a line's arrivals could be computed at all.
///
/// An available line with no arrivals means nothing is scheduled; an
/// unavailable one means no feed covering it answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedAvailability {
    Available { feed: FeedGroupId },
    Unavailable { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineFeedStatus {
    pub line: LineCode,
    #[serde(flatten)]
    pub availability: FeedAvailability,
}

impl LineFeedStatus {
    pub fn is_available(&self) -> bool {
        matches!(self.availability, FeedAvailability::Available { .. })
    }
}

/// Merge every snapshot's predictions for `station` into one board.
///
/// Minutes are measured from `reference_time`. Ordering is soonest first, then
/// line code, destination and feed so equal inputs always give equal output.
/// Pass the request's clock here, not a snapshot's decode time: a cached
/// snapshot reused for a later request must still count down.
pub fn aggregate_arrivals<'a>(
    store: &StaticReferenceStore,
    snapshots: impl IntoIterator<Item = &'a FeedSnapshot>,
    station: &Station,
    reference_time: DateTime<Utc>,
    policy: &ArrivalPolicy,
) -> Vec<TrainArrival> {
    let mut arrivals: Vec<TrainArrival> = snapshots
        .into_iter()
        .flat_map(|snapshot| {
            snapshot
                .trip_updates
                .iter()
                .flat_map(move |update| arrivals_for_trip(store, snapshot, update, station, reference_time))
        })
        .collect();

    arrivals.sort_by(|a, b| {
        a.minutes_away
            .cmp(&b.minutes_away)
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.destination.cmp(&b.destination))
            .then_with(|| a.feed.cmp(&b.feed))
    });

    if let Some(max) = policy.max_per_line {
        let mut seen: HashMap<LineCode, usize> = HashMap::new();
        arrivals.retain(|arrival| {
            let count = seen.entry(arrival.line.clone()).or_default();
            *count += 1;
            *count <= max
        });
    }

    arrivals
}

fn arrivals_for_trip(
    store: &StaticReferenceStore,
    snapshot: &FeedSnapshot,
    update: &TripUpdateRecord,
    station: &Station,
    reference_time: DateTime<Utc>,
) -> Vec<TrainArrival> {
    let stops_here = update.stop_times.iter().filter(|stop_time| {
        store
            .station_for_stop(&stop_time.stop_id)
            .is_some_and(|owner| owner.id == station.id)
    });

    let mut arrivals = Vec::new();
    for stop_time in stops_here {
        let line = store
            .line_for_route(&update.route_id)
            .cloned()
            .unwrap_or_else(|| LineCode::new(&update.route_id));

        let direction = split_platform_suffix(&stop_time.stop_id)
            .and_then(|(_, suffix)| Direction::from_platform_suffix(suffix))
            .or(update.direction)
            .unwrap_or(Direction::Unknown);

        let seconds = (stop_time.predicted - reference_time).num_seconds().max(0);

        arrivals.push(TrainArrival {
            line,
            direction,
            destination: destination(store, update),
            minutes_away: u32::try_from(seconds / 60).unwrap_or(u32::MAX),
            feed: snapshot.group.clone(),
        });
    }
    arrivals
}

/// Name of the trip's last predicted stop, or its bare stop ID if unknown.
fn destination(store: &StaticReferenceStore, update: &TripUpdateRecord) -> String {
    let Some(last) = update.stop_times.last() else {
        return String::new();
    };
    store
        .station_for_stop(&last.stop_id)
        .map(|station| station.name.clone())
        .unwrap_or_else(|| parent_stop_id(&last.stop_id).to_string())
}

/// Availability of each of `lines` given the outcome of every fetched group.
///
/// A line is available when any covering group produced a snapshot.
pub fn line_feed_statuses<'a>(
    lines: &BTreeSet<LineCode>,
    outcomes: impl IntoIterator<Item = (&'a FeedGroup, Result<&'a FeedSnapshot, &'a FeedError>)> + Clone,
) -> Vec<LineFeedStatus> {
    lines
        .iter()
        .map(|line| {
            let mut failure: Option<&FeedError> = None;
            let mut available: Option<&FeedGroupId> = None;

            for (group, result) in outcomes.clone() {
                if !group.covers(line) {
                    continue;
                }
                match result {
                    Ok(_) => {
                        available = Some(&group.id);
                        break;
                    }
                    Err(error) => failure = Some(error),
                }
            }

            let availability = match (available, failure) {
                (Some(feed), _) => FeedAvailability::Available { feed: feed.clone() },
                (None, Some(error)) => FeedAvailability::Unavailable {
                    reason: error.to_string(),
                },
                (None, None) => FeedAvailability::Unavailable {
                    reason: FeedError::NotConfigured(line.to_string()).to_string(),
                },
            };

            LineFeedStatus {
                line: line.clone(),
                availability,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::feed::fixtures::*;
    use crate::feed::{decode_feed, StopTimePrediction};
    use crate::provider::static_provider::tests::fixture_store;

    fn snapshot(group: &str, entities: Vec<crate::feed::proto::FeedEntity>) -> FeedSnapshot {
        let now = base_time();
        decode_feed(&FeedGroupId::new(group), &feed_payload(now, entities), now).unwrap()
    }

    #[test]
    fn test_merges_snapshots_soonest_first() {
        let store = fixture_store();
        let station = store.station_by_id("127").unwrap().clone();
        let now = base_time();

        let numbered = snapshot(
            "gtfs",
            vec![
                trip_entity("1-a", "1", &[("127S", now + secs(300)), ("142S", now + secs(1500))]),
                trip_entity("7-a", "7X", &[("725S", now + secs(120)), ("726S", now + secs(300))]),
                trip_entity("gs-a", "GS", &[("902N", now + secs(60)), ("901N", now + secs(200))]),
            ],
        );
        let broadway = snapshot(
            "gtfs-nqrw",
            vec![
                trip_entity("n-a", "N", &[("R16N", now + secs(120)), ("R01N", now + secs(1800))]),
                trip_entity("q-a", "Q", &[("R17S", now + secs(60)), ("D43S", now + secs(2400))]),
            ],
        );

        let board = aggregate_arrivals(&store, [&numbered, &broadway], &station, now, &ArrivalPolicy::default());
        let summary: Vec<(&str, u32)> = board.iter().map(|a| (a.line.as_str(), a.minutes_away)).collect();
        assert_eq!(summary, vec![("S", 1), ("7", 2), ("N", 2), ("1", 5)]);

        assert_eq!(board[0].destination, "Grand Central-42 St");
        assert_eq!(board[0].direction, Direction::Uptown);
        assert_eq!(board[1].destination, "34 St-Hudson Yards");
        assert_eq!(board[1].direction, Direction::Downtown);
        assert_eq!(board[2].feed.as_str(), "gtfs-nqrw");
        assert_eq!(board[3].destination, "South Ferry");
    }

    #[test]
    fn test_minutes_count_from_request_time_not_decode_time() {
        let store = fixture_store();
        let station = store.station_by_id("127").unwrap().clone();
        let decoded_at = base_time();

        let feed = snapshot("gtfs", vec![trip_entity("1-a", "1", &[("127S", decoded_at + secs(600))])]);
        assert_eq!(feed.decoded_at, decoded_at);

        let fresh = aggregate_arrivals(&store, [&feed], &station, decoded_at, &ArrivalPolicy::default());
        assert_eq!(fresh[0].minutes_away, 10);

        let later = aggregate_arrivals(&store, [&feed], &station, decoded_at + secs(240), &ArrivalPolicy::default());
        assert_eq!(later[0].minutes_away, 6);
    }

    #[test]
    fn test_past_predictions_clamp_to_zero() {
        let store = fixture_store();
        let station = store.station_by_id("127").unwrap().clone();
        let now = base_time();

        let feed = snapshot(
            "gtfs",
            vec![
                trip_entity("late", "1", &[("127N", now - secs(90))]),
                trip_entity("exact", "2", &[("127N", now)]),
                trip_entity("soon", "3", &[("127N", now + secs(59))]),
            ],
        );

        let board = aggregate_arrivals(&store, [&feed], &station, now, &ArrivalPolicy::default());
        assert_eq!(board.len(), 3);
        assert!(board.iter().all(|a| a.minutes_away == 0));

        // Equal minutes fall back to line order.
        let lines: Vec<&str> = board.iter().map(|a| a.line.as_str()).collect();
        assert_eq!(lines, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_other_stations_and_unknown_stops_are_ignored() {
        let store = fixture_store();
        let station = store.station_by_id("128").unwrap().clone();
        let now = base_time();

        let feed = snapshot(
            "gtfs",
            vec![
                trip_entity("1-a", "1", &[("127S", now + secs(60)), ("128S", now + secs(180))]),
                trip_entity("2-a", "2", &[("999S", now + secs(60))]),
            ],
        );

        let board = aggregate_arrivals(&store, [&feed], &station, now, &ArrivalPolicy::default());
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].minutes_away, 3);
        assert_eq!(board[0].destination, "34 St-Penn Station");
    }

    #[test]
    fn test_direction_falls_back_to_trip_descriptor() {
        let store = fixture_store();
        let station = store.station_by_id("127").unwrap().clone();
        let now = base_time();

        let mut feed = FeedSnapshot::empty(FeedGroupId::new("gtfs"), now);
        feed.trip_updates.push(TripUpdateRecord {
            trip_id: "t".into(),
            route_id: "1".into(),
            direction: Some(Direction::Downtown),
            stop_times: vec![
                StopTimePrediction { stop_id: "127".into(), predicted: now + secs(240) },
                StopTimePrediction { stop_id: "A99".into(), predicted: now + secs(600) },
            ],
        });

        let board = aggregate_arrivals(&store, [&feed], &station, now, &ArrivalPolicy::default());
        assert_eq!(board[0].direction, Direction::Downtown);
        assert_eq!(board[0].destination, "A99");
    }

    #[test]
    fn test_max_per_line_trims_each_line() {
        let store = fixture_store();
        let station = store.station_by_id("127").unwrap().clone();
        let now = base_time();

        let feed = snapshot(
            "gtfs",
            (0..5)
                .map(|i| trip_entity(&format!("1-{i}"), "1", &[("127S", now + secs(120 * (i + 1)))]))
                .chain([trip_entity("2-a", "2", &[("127S", now + secs(900))])])
                .collect(),
        );

        let policy = ArrivalPolicy { max_per_line: Some(2) };
        let board = aggregate_arrivals(&store, [&feed], &station, now, &policy);
        let lines: Vec<&str> = board.iter().map(|a| a.line.as_str()).collect();
        assert_eq!(lines, vec!["1", "1", "2"]);
        assert_eq!(board[1].minutes_away, 4);
    }

    #[test]
    fn test_line_statuses_distinguish_unavailable_from_empty() {
        let now = base_time();
        let numbered = FeedGroup::trip_updates("gtfs", "http://feeds.test/gtfs", &["1", "2", "3", "7", "S"]);
        let broadway = FeedGroup::trip_updates("gtfs-nqrw", "http://feeds.test/nqrw", &["N", "Q", "R", "W"]);

        let outcomes = vec![
            (numbered, Ok(Arc::new(FeedSnapshot::empty(FeedGroupId::new("gtfs"), now)))),
            (broadway, Err(FeedError::Timeout(Duration::from_secs(3)))),
        ];
        let lines: BTreeSet<LineCode> = ["1", "N", "SI"].into_iter().map(LineCode::from).collect();

        let statuses = line_feed_statuses(&lines, outcomes.iter().map(|(g, r)| (g, r.as_ref().map(Arc::as_ref))));
        assert_eq!(statuses.len(), 3);

        assert_eq!(statuses[0].line.as_str(), "1");
        assert!(statuses[0].is_available());

        assert_eq!(statuses[1].line.as_str(), "N");
        assert!(matches!(&statuses[1].availability, FeedAvailability::Unavailable { reason } if reason.contains("Timed out")));

        assert_eq!(statuses[2].line.as_str(), "SI");
        assert!(matches!(&statuses[2].availability, FeedAvailability::Unavailable { reason } if reason.contains("No feed group")));
    }
}
