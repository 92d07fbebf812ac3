//! Payload builders shared by decoder, aggregator and façade tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use prost::Message;

use crate::feed::proto;

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub(crate) fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}

fn header(at: DateTime<Utc>) -> proto::FeedHeader {
    proto::FeedHeader {
        gtfs_realtime_version: Some("1.0".into()),
        incrementality: Some(0),
        timestamp: Some(at.timestamp() as u64),
    }
}

pub(crate) fn trip_entity(trip_id: &str, route_id: &str, stops: &[(&str, DateTime<Utc>)]) -> proto::FeedEntity {
    let stop_time_update = stops
        .iter()
        .enumerate()
        .map(|(seq, (stop_id, at))| proto::StopTimeUpdate {
            stop_sequence: Some(seq as u32 + 1),
            arrival: Some(proto::StopTimeEvent {
                delay: None,
                time: Some(at.timestamp()),
            }),
            departure: None,
            stop_id: Some(stop_id.to_string()),
        })
        .collect();

    proto::FeedEntity {
        id: Some(format!("entity-{trip_id}")),
        is_deleted: None,
        trip_update: Some(proto::TripUpdate {
            trip: Some(proto::TripDescriptor {
                trip_id: Some(trip_id.into()),
                start_time: None,
                start_date: Some("20240501".into()),
                route_id: Some(route_id.into()),
                direction_id: None,
            }),
            stop_time_update,
            timestamp: None,
        }),
        alert: None,
    }
}

pub(crate) fn alert_entity(id: &str, routes: &[&str], effect: i32, text: &str) -> proto::FeedEntity {
    proto::FeedEntity {
        id: Some(id.into()),
        is_deleted: None,
        trip_update: None,
        alert: Some(proto::Alert {
            active_period: vec![],
            informed_entity: routes
                .iter()
                .map(|route| proto::EntitySelector {
                    agency_id: Some("MTASBWY".into()),
                    route_id: Some(route.to_string()),
                    stop_id: None,
                })
                .collect(),
            cause: None,
            effect: Some(effect),
            header_text: Some(proto::TranslatedString {
                translation: vec![proto::Translation {
                    text: Some(text.into()),
                    language: Some("en".into()),
                }],
            }),
            description_text: None,
        }),
    }
}

pub(crate) fn feed_payload(at: DateTime<Utc>, entities: Vec<proto::FeedEntity>) -> Vec<u8> {
    proto::FeedMessage {
        header: Some(header(at)),
        entity: entities,
    }
    .encode_to_vec()
}

/// Encode `valid` entities with `raw` spliced in as an entity at `position`.
pub(crate) fn payload_with_raw_entity(
    at: DateTime<Utc>,
    valid: Vec<proto::FeedEntity>,
    position: usize,
    raw: &[u8],
) -> Vec<u8> {
    let mut payload = proto::FeedMessage {
        header: Some(header(at)),
        entity: vec![],
    }
    .encode_to_vec();

    for (index, entity) in valid.into_iter().enumerate() {
        if index == position {
            push_entity_bytes(&mut payload, raw);
        }
        push_entity_bytes(&mut payload, &entity.encode_to_vec());
    }
    payload
}

fn push_entity_bytes(payload: &mut Vec<u8>, body: &[u8]) {
    prost::encoding::encode_key(2, prost::encoding::WireType::LengthDelimited, payload);
    prost::encoding::encode_varint(body.len() as u64, payload);
    payload.extend_from_slice(body);
}
