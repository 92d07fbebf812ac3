//! Service alerts reduced to per-line status.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::feed::{ActivePeriod, AlertEffect, AlertRecord, FeedSnapshot};
use crate::identifiers::LineCode;
use crate::models::types::AlertCategory;
use crate::provider::static_provider::StaticReferenceStore;

/// Validity bounds of an alert. A missing bound is open-ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AlertWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AlertWindow {
    fn from_periods(periods: &[ActivePeriod]) -> Option<Self> {
        let (first, rest) = periods.split_first()?;
        let mut window = AlertWindow {
            start: first.start,
            end: first.end,
        };
        for period in rest {
            window = window.widen(&AlertWindow {
                start: period.start,
                end: period.end,
            });
        }
        Some(window)
    }

    fn widen(&self, other: &AlertWindow) -> AlertWindow {
        AlertWindow {
            start: self.start.zip(other.start).map(|(a, b)| a.min(b)),
            end: self.end.zip(other.end).map(|(a, b)| a.max(b)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceAlert {
    pub lines: BTreeSet<LineCode>,
    pub category: AlertCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub window: Option<AlertWindow>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    GoodService,
    PlannedWork,
    Delay,
    ServiceChange,
    Suspended,
    /// The alerts feed could not be read; nothing is known about the line
    Unavailable,
}

impl From<AlertCategory> for LineStatus {
    fn from(category: AlertCategory) -> Self {
        match category {
            AlertCategory::GoodService => LineStatus::GoodService,
            AlertCategory::PlannedWork => LineStatus::PlannedWork,
            AlertCategory::Delay => LineStatus::Delay,
            AlertCategory::ServiceChange => LineStatus::ServiceChange,
            AlertCategory::Suspended => LineStatus::Suspended,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineServiceStatus {
    pub line: LineCode,
    pub status: LineStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertReport {
    pub available: bool,
    pub statuses: Vec<LineServiceStatus>,
    pub alerts: Vec<ServiceAlert>,
}

impl AlertReport {
    pub fn unavailable<'a>(lines: impl IntoIterator<Item = &'a LineCode>) -> Self {
        let lines: BTreeSet<&LineCode> = lines.into_iter().collect();
        Self {
            available: false,
            statuses: lines
                .into_iter()
                .map(|line| LineServiceStatus {
                    line: line.clone(),
                    status: LineStatus::Unavailable,
                })
                .collect(),
            alerts: Vec::new(),
        }
    }
}

/// Severity of an alert at `at`, or `None` when it no longer applies.
pub fn categorize(record: &AlertRecord, at: DateTime<Utc>) -> Option<AlertCategory> {
    let periods = &record.active_periods;
    if !periods.is_empty() {
        if periods.iter().all(|period| period.has_ended(at)) {
            return None;
        }
        let mut live = periods.iter().filter(|period| !period.has_ended(at));
        if live.all(|period| period.is_upcoming(at)) {
            return Some(AlertCategory::PlannedWork);
        }
    }

    let category = match record.effect {
        Some(AlertEffect::NoService) => AlertCategory::Suspended,
        Some(AlertEffect::SignificantDelays) => AlertCategory::Delay,
        Some(AlertEffect::NoEffect) => AlertCategory::GoodService,
        _ => AlertCategory::ServiceChange,
    };
    Some(category)
}

fn to_service_alert(store: &StaticReferenceStore, record: &AlertRecord, at: DateTime<Utc>) -> Option<ServiceAlert> {
    let category = categorize(record, at)?;
    let lines = record
        .route_ids
        .iter()
        .map(|route| {
            store
                .line_for_route(route)
                .cloned()
                .unwrap_or_else(|| LineCode::new(route))
        })
        .collect();

    Some(ServiceAlert {
        lines,
        category,
        message: record.header.clone(),
        description: record.description.clone(),
        window: AlertWindow::from_periods(&record.active_periods),
    })
}

/// Collapse alerts that repeat the same message for overlapping lines.
///
/// Merging can make a previously disjoint pair overlap, so passes repeat until
/// nothing changes.
pub fn merge_duplicates(mut alerts: Vec<ServiceAlert>) -> Vec<ServiceAlert> {
    loop {
        let mut merged: Vec<ServiceAlert> = Vec::with_capacity(alerts.len());
        let mut changed = false;

        for alert in alerts {
            let target = merged
                .iter_mut()
                .find(|kept| kept.message == alert.message && !kept.lines.is_disjoint(&alert.lines));
            match target {
                Some(kept) => {
                    kept.lines.extend(alert.lines);
                    kept.category = kept.category.max(alert.category);
                    kept.window = match (kept.window, alert.window) {
                        (Some(a), Some(b)) => Some(a.widen(&b)),
                        _ => None,
                    };
                    if kept.description.is_none() {
                        kept.description = alert.description;
                    }
                    changed = true;
                }
                None => merged.push(alert),
            }
        }

        alerts = merged;
        if !changed {
            return alerts;
        }
    }
}

/// Alerts touching `lines` and the resulting status of each line.
pub fn aggregate_alerts<'a>(
    store: &StaticReferenceStore,
    snapshots: impl IntoIterator<Item = &'a FeedSnapshot>,
    lines: &BTreeSet<LineCode>,
    reference_time: DateTime<Utc>,
) -> AlertReport {
    let active: Vec<ServiceAlert> = snapshots
        .into_iter()
        .flat_map(|snapshot| snapshot.alerts.iter())
        .filter_map(|record| to_service_alert(store, record, reference_time))
        .collect();

    // Merge before filtering so duplicates on unrequested lines still fold in.
    let mut alerts = merge_duplicates(active);
    alerts.retain(|alert| !alert.lines.is_disjoint(lines));
    alerts.sort_by(|a, b| b.category.cmp(&a.category).then_with(|| a.message.cmp(&b.message)));

    let statuses = lines
        .iter()
        .map(|line| {
            let worst = alerts
                .iter()
                .filter(|alert| alert.lines.contains(line))
                .map(|alert| alert.category)
                .max()
                .unwrap_or(AlertCategory::GoodService);
            LineServiceStatus {
                line: line.clone(),
                status: worst.into(),
            }
        })
        .collect();

    AlertReport {
        available: true,
        statuses,
        alerts,
    }
}
