//! Tolerant GTFS-RT decoder.
//!
//! The `FeedMessage` envelope is walked field by field instead of being
//! decoded in one call. Every `entity` field is cut out by its length prefix
//! and decoded on its own, so one corrupt entity costs only itself.
//!
//! Failure classes:
//! - **Envelope**: no usable header, an invalid field key, a group wire type,
//!   or an unknown field that overruns the payload. The whole feed fails.
//! - **Entry**: an entity that fails to decode, overruns the payload, or lacks
//!   the identifiers needed downstream. It is dropped and counted.

use chrono::{DateTime, Utc};
use prost::encoding::{decode_key, decode_varint, WireType};
use prost::Message;

use crate::feed::proto;
use crate::feed::{ActivePeriod, AlertEffect, AlertRecord, FeedSnapshot, StopTimePrediction, TripUpdateRecord};
use crate::identifiers::{FeedGroupId, TripId};
use crate::models::types::{Direction, FeedError};

const HEADER_TAG: u32 = 1;
const ENTITY_TAG: u32 = 2;

enum EntityOutcome {
    TripUpdate(TripUpdateRecord),
    Alert(AlertRecord),
    Ignored,
}

/// Decode one feed group's payload.
pub fn decode_feed(
    group: &FeedGroupId,
    payload: &[u8],
    decoded_at: DateTime<Utc>,
) -> Result<FeedSnapshot, FeedError> {
    let mut buf = payload;
    let mut header: Option<proto::FeedHeader> = None;
    let mut snapshot = FeedSnapshot::empty(group.clone(), decoded_at);

    while !buf.is_empty() {
        let (tag, wire_type) = decode_key(&mut buf).map_err(|e| envelope(format!("bad field key: {e}")))?;

        match (tag, wire_type) {
            (HEADER_TAG, WireType::LengthDelimited) => {
                let body = split_length_delimited(&mut buf).ok_or_else(|| envelope("truncated header"))?;
                let decoded = proto::FeedHeader::decode(body).map_err(|e| envelope(format!("bad header: {e}")))?;
                header = Some(decoded);
            }
            (ENTITY_TAG, WireType::LengthDelimited) => {
                let Some(body) = split_length_delimited(&mut buf) else {
                    // The entity boundary is lost, so nothing after it can be framed.
                    snapshot.skipped_entries += 1;
                    tracing::debug!(%group, "entity overruns payload, stopping");
                    break;
                };

                match decode_entity(body) {
                    Ok(EntityOutcome::TripUpdate(update)) => snapshot.trip_updates.push(update),
                    Ok(EntityOutcome::Alert(alert)) => snapshot.alerts.push(alert),
                    Ok(EntityOutcome::Ignored) => {}
                    Err(reason) => {
                        snapshot.skipped_entries += 1;
                        tracing::debug!(%group, %reason, "skipping entity");
                    }
                }
            }
            (_, wire_type) => skip_field(wire_type, &mut buf)?,
        }
    }

    let header = header.ok_or_else(|| envelope("missing feed header"))?;
    snapshot.feed_timestamp = header.timestamp.and_then(unix_seconds);

    if snapshot.skipped_entries > 0 {
        tracing::warn!(
            %group,
            skipped = snapshot.skipped_entries,
            kept = snapshot.trip_updates.len() + snapshot.alerts.len(),
            "dropped malformed feed entities"
        );
    }

    Ok(snapshot)
}

fn envelope(reason: impl Into<String>) -> FeedError {
    FeedError::Envelope(reason.into())
}

/// Read a length prefix and split that many bytes off the front of `buf`.
fn split_length_delimited<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = usize::try_from(decode_varint(buf).ok()?).ok()?;
    let data: &'a [u8] = *buf;
    if len > data.len() {
        return None;
    }
    let (body, rest) = data.split_at(len);
    *buf = rest;
    Some(body)
}

fn skip_field(wire_type: WireType, buf: &mut &[u8]) -> Result<(), FeedError> {
    let width = match wire_type {
        WireType::Varint => {
            decode_varint(buf).map_err(|e| envelope(format!("bad varint: {e}")))?;
            return Ok(());
        }
        WireType::LengthDelimited => {
            split_length_delimited(buf).ok_or_else(|| envelope("truncated unknown field"))?;
            return Ok(());
        }
        WireType::SixtyFourBit => 8,
        WireType::ThirtyTwoBit => 4,
        WireType::StartGroup | WireType::EndGroup => {
            return Err(envelope("group fields are not supported"));
        }
    };

    let data = *buf;
    if data.len() < width {
        return Err(envelope("truncated fixed-width field"));
    }
    *buf = &data[width..];
    Ok(())
}

fn decode_entity(body: &[u8]) -> Result<EntityOutcome, String> {
    let entity = proto::FeedEntity::decode(body).map_err(|e| e.to_string())?;

    if entity.is_deleted.unwrap_or(false) {
        return Ok(EntityOutcome::Ignored);
    }

    let id = entity.id.unwrap_or_default();
    if let Some(update) = entity.trip_update {
        return convert_trip_update(update).map(EntityOutcome::TripUpdate);
    }
    if let Some(alert) = entity.alert {
        return convert_alert(id, alert);
    }

    // Vehicle positions and empty entities carry nothing we aggregate.
    Ok(EntityOutcome::Ignored)
}

fn convert_trip_update(update: proto::TripUpdate) -> Result<TripUpdateRecord, String> {
    let trip = update.trip.ok_or("trip update without trip descriptor")?;
    let trip_id = non_empty(trip.trip_id).ok_or("trip descriptor without trip_id")?;
    let route_id = non_empty(trip.route_id).ok_or_else(|| format!("trip {trip_id} without route_id"))?;

    let total = update.stop_time_update.len();
    let stop_times: Vec<StopTimePrediction> = update
        .stop_time_update
        .into_iter()
        .filter_map(|stu| {
            let stop_id = non_empty(stu.stop_id)?;
            let time = stu
                .arrival
                .and_then(|event| event.time)
                .or_else(|| stu.departure.and_then(|event| event.time))?;
            let predicted = DateTime::from_timestamp(time, 0)?;
            Some(StopTimePrediction { stop_id, predicted })
        })
        .collect();

    if stop_times.is_empty() {
        return Err(format!("trip {trip_id} has no usable predictions"));
    }
    if stop_times.len() < total {
        tracing::debug!(%trip_id, dropped = total - stop_times.len(), "dropped incomplete stop-time updates");
    }

    Ok(TripUpdateRecord {
        trip_id: TripId::new(trip_id),
        route_id,
        direction: trip.direction_id.map(Direction::from_gtfs),
        stop_times,
    })
}

fn convert_alert(id: String, alert: proto::Alert) -> Result<EntityOutcome, String> {
    let mut route_ids: Vec<String> = alert
        .informed_entity
        .into_iter()
        .filter_map(|selector| non_empty(selector.route_id))
        .collect();
    route_ids.sort();
    route_ids.dedup();

    // Station-only notices are not line-scoped.
    if route_ids.is_empty() {
        return Ok(EntityOutcome::Ignored);
    }

    let header = alert
        .header_text
        .as_ref()
        .and_then(pick_translation)
        .ok_or_else(|| format!("alert {id} without header text"))?;
    let description = alert.description_text.as_ref().and_then(pick_translation);

    let active_periods = alert
        .active_period
        .into_iter()
        .map(|range| ActivePeriod {
            start: range.start.and_then(unix_seconds),
            end: range.end.and_then(unix_seconds),
        })
        .collect();

    Ok(EntityOutcome::Alert(AlertRecord {
        id,
        route_ids,
        effect: alert.effect.and_then(AlertEffect::from_gtfs),
        header,
        description,
        active_periods,
    }))
}

/// Prefer plain English, then any non-HTML translation, then whatever exists.
fn pick_translation(text: &proto::TranslatedString) -> Option<String> {
    let usable = || text.translation.iter().filter(|t| t.text.as_deref().is_some_and(|s| !s.trim().is_empty()));
    let language = |t: &&proto::Translation| t.language.as_deref().unwrap_or("").to_ascii_lowercase();

    usable()
        .find(|t| matches!(language(t).as_str(), "en" | ""))
        .or_else(|| usable().find(|t| !language(t).contains("html")))
        .or_else(|| usable().next())
        .and_then(|t| t.text.as_ref())
        .map(|s| s.trim().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn unix_seconds(secs: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
}
