use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One HTTP request observation reported by an instrumented client.
///
/// Every field is required on the wire. `timestamp` is the client clock in
/// epoch milliseconds; it is only used for display and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub project_id: String,
    pub route: String,
    pub method: String,
    pub status_code: u16,
    /// Milliseconds
    pub response_time: i64,
    pub timestamp: i64,
}

#[derive(thiserror::Error, Debug)]
#[error("malformed telemetry frame: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl TelemetryEvent {
    /// Decodes one frame. Only a JSON object is a frame; positional arrays
    /// are rejected even when their values line up with the fields.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let fields: Map<String, Value> = serde_json::from_slice(payload)?;
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// An event as committed by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: TelemetryEvent,
    pub persisted_at: DateTime<Utc>,
}

pub const ACK_STATUS: &str = "received";
pub const ACK_PERSISTED: &str = "metric saved";
pub const ACK_BUFFERED_ONLY: &str = "metric buffered; persistence failed";

/// Acknowledgment sent back for every decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    pub message: String,
}

impl Ack {
    pub fn new(persisted: bool) -> Self {
        Ack {
            status: ACK_STATUS.to_string(),
            message: if persisted {
                ACK_PERSISTED
            } else {
                ACK_BUFFERED_ONLY
            }
            .to_string(),
        }
    }
}
