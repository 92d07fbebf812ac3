//! Realtime feed decoding.
//!
//! One upstream payload per feed group is decoded into a [`FeedSnapshot`].
//! Snapshots are independent; merging happens in the aggregators.

pub mod decoder;
pub mod proto;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, Utc};

use crate::identifiers::{FeedGroupId, TripId};
use crate::models::types::Direction;

pub use decoder::decode_feed;

/// Decoded form of one feed group's payload at one point in time.
#[derive(Clone, Debug)]
pub struct FeedSnapshot {
    pub group: FeedGroupId,
    /// Header timestamp written by the upstream producer
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub decoded_at: DateTime<Utc>,
    pub trip_updates: Vec<TripUpdateRecord>,
    pub alerts: Vec<AlertRecord>,
    /// Entities dropped because they were malformed or unusable
    pub skipped_entries: usize,
}

impl FeedSnapshot {
    pub fn empty(group: FeedGroupId, decoded_at: DateTime<Utc>) -> Self {
        Self {
            group,
            feed_timestamp: None,
            decoded_at,
            trip_updates: Vec::new(),
            alerts: Vec::new(),
            skipped_entries: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TripUpdateRecord {
    pub trip_id: TripId,
    pub route_id: String,
    pub direction: Option<Direction>,
    /// Predictions in feed order; the last one is the trip's final stop
    pub stop_times: Vec<StopTimePrediction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopTimePrediction {
    pub stop_id: String,
    pub predicted: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlertRecord {
    pub id: String,
    pub route_ids: Vec<String>,
    pub effect: Option<AlertEffect>,
    pub header: String,
    pub description: Option<String>,
    pub active_periods: Vec<ActivePeriod>,
}

/// Open-ended on either side when the producer omits a bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ActivePeriod {
    pub fn has_ended(&self, at: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| end < at)
    }

    pub fn is_upcoming(&self, at: DateTime<Utc>) -> bool {
        self.start.is_some_and(|start| start > at)
    }
}

/// GTFS-RT `Alert.Effect`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AlertEffect {
    NoService = 1,
    ReducedService = 2,
    SignificantDelays = 3,
    Detour = 4,
    AdditionalService = 5,
    ModifiedService = 6,
    OtherEffect = 7,
    UnknownEffect = 8,
    StopMoved = 9,
    NoEffect = 10,
    AccessibilityIssue = 11,
}

impl AlertEffect {
    pub fn from_gtfs(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::NoService),
            2 => Some(Self::ReducedService),
            3 => Some(Self::SignificantDelays),
            4 => Some(Self::Detour),
            5 => Some(Self::AdditionalService),
            6 => Some(Self::ModifiedService),
            7 => Some(Self::OtherEffect),
            8 => Some(Self::UnknownEffect),
            9 => Some(Self::StopMoved),
            10 => Some(Self::NoEffect),
            11 => Some(Self::AccessibilityIssue),
            _ => None,
        }
    }
}
