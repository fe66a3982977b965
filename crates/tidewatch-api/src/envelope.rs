// Wire types for the Signal K REST API.
//
// The server answers value reads with an "envelope": a current value plus
// its sample timestamp, optionally broken down per source when several
// sensors publish the same path. Writes are acknowledged with a request
// record that is polled until it settles.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response envelope for a single path.
///
/// Either `value`/`timestamp` describe the (single-source) current value, or
/// `values` carries one entry per source with `$source` naming the primary.
/// `meta` is descriptive path metadata (units, display name) and may appear
/// on either shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueEnvelope {
    pub value: Option<serde_json::Value>,
    pub timestamp: Option<String>,
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
    /// The source the server designates as primary for this path.
    #[serde(rename = "$source")]
    pub primary_source: Option<String>,
    /// Per-source breakdown, keyed by source identifier.
    pub values: Option<HashMap<String, SourceValue>>,
}

impl ValueEnvelope {
    /// Parse the server-reported sample timestamp, if present and well formed.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

/// One source's value inside a [`ValueEnvelope::values`] map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceValue {
    pub value: Option<serde_json::Value>,
    pub timestamp: Option<String>,
}

impl SourceValue {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

/// Parse a Signal K timestamp (RFC 3339, usually with fractional seconds).
///
/// Malformed timestamps are tolerated: the value update still applies, only
/// the sample time is dropped.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One requested path in a batch read: `{path, type, source?}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSpec {
    pub path: String,
    /// Value-kind tag, e.g. `"double"`, `"bool"`, `"string"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Response to a batch read: one envelope per requested path.
pub type BatchResponse = HashMap<String, ValueEnvelope>;

// ── Write acknowledgements ──────────────────────────────────────────

/// Lifecycle state of a durable write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestState {
    Pending,
    Completed,
    Failed,
}

impl RequestState {
    /// Completed or Failed -- no further polling occurs once reached.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Acknowledgement of a write, and the shape returned by the status poll.
///
/// All three required fields are optional at the wire level so the caller
/// can detect a malformed acknowledgement (and force a failure) instead of
/// rejecting the whole body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteAck {
    pub state: Option<RequestState>,
    #[serde(rename = "statusCode")]
    pub status_code: Option<u16>,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WriteAck {
    /// Whether the acknowledgement carries every field the completion state
    /// machine needs (state, status code, request id).
    pub fn is_well_formed(&self) -> bool {
        self.state.is_some() && self.status_code.is_some() && self.request_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_single_value() {
        let env: ValueEnvelope = serde_json::from_value(serde_json::json!({
            "value": 12.5,
            "timestamp": "2024-10-04T16:51:44.123Z",
        }))
        .expect("envelope");
        assert_eq!(env.value, Some(serde_json::json!(12.5)));
        assert!(env.values.is_none());
        assert!(env.parsed_timestamp().is_some());
    }

    #[test]
    fn envelope_with_sources() {
        let env: ValueEnvelope = serde_json::from_value(serde_json::json!({
            "value": 1,
            "$source": "a",
            "values": {
                "a": { "value": 1, "timestamp": "2024-10-04T16:51:44Z" },
                "b": { "value": 2 }
            }
        }))
        .expect("envelope");
        let values = env.values.expect("values map");
        assert_eq!(values.len(), 2);
        assert_eq!(env.primary_source.as_deref(), Some("a"));
    }

    #[test]
    fn malformed_timestamp_is_dropped() {
        let env: ValueEnvelope = serde_json::from_value(serde_json::json!({
            "value": true,
            "timestamp": "not-a-date",
        }))
        .expect("envelope");
        assert!(env.parsed_timestamp().is_none());
        assert!(env.value.is_some());
    }

    #[test]
    fn ack_missing_fields_is_not_well_formed() {
        let ack: WriteAck = serde_json::from_value(serde_json::json!({
            "state": "PENDING",
            "statusCode": 202,
        }))
        .expect("ack");
        assert!(!ack.is_well_formed());

        let ack: WriteAck = serde_json::from_value(serde_json::json!({
            "state": "COMPLETED",
            "statusCode": 200,
            "requestId": "r1",
        }))
        .expect("ack");
        assert!(ack.is_well_formed());
        assert!(ack.state.expect("state").is_terminal());
    }

    #[test]
    fn path_spec_serializes_type_tag() {
        let spec = PathSpec {
            path: "navigation.speedOverGround".into(),
            kind: "double".into(),
            source: None,
        };
        let json = serde_json::to_value(&spec).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"path": "navigation.speedOverGround", "type": "double"})
        );
    }
}
