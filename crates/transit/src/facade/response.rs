//! JSON-ready results of the façade operations.
//!
//! Every realtime section carries its own availability, so callers can tell
//! "nothing to report" apart from "could not find out".

use std::sync::Arc;

use serde::Serialize;

use crate::alerts::AlertReport;
use crate::arrivals::{LineFeedStatus, TrainArrival};
use crate::models::types::Borough;
use crate::provider::static_provider::{Line, Station};
use crate::spatial::index::NearbyStation;

#[derive(Clone, Debug, Serialize)]
pub struct StationArrivalsResponse {
    pub station: Arc<Station>,
    pub arrivals: Vec<TrainArrival>,
    /// One entry per line serving the station
    pub feeds: Vec<LineFeedStatus>,
    pub alerts: AlertReport,
    pub skipped_entries: usize,
    /// Unix seconds
    pub generated_at: i64,
}

impl StationArrivalsResponse {
    /// True when at least one line's arrivals could not be fetched.
    pub fn is_degraded(&self) -> bool {
        !self.alerts.available || self.feeds.iter().any(|status| !status.is_available())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoroughStations {
    pub borough: Borough,
    pub name: &'static str,
    pub stations: Vec<Arc<Station>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineDetailResponse {
    pub line: Arc<Line>,
    /// Non-empty groups only, in fixed borough order
    pub boroughs: Vec<BoroughStations>,
    pub alerts: AlertReport,
    pub skipped_entries: usize,
    pub generated_at: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct NearbyOrigin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<Arc<Station>>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct NearbyStationsResponse {
    pub origin: NearbyOrigin,
    pub radius_km: f64,
    pub stations: Vec<NearbyStation>,
    pub generated_at: i64,
}
