use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

mod validation;

pub use validation::{validate_esp_now, validate_report, ValidationError};

/// StatusReport is the wire type agents POST to the coordinator.
///
/// Absent optional fields mean "no new value" — the registry preserves the
/// previously stored value for any field the report omits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusReport {
    /// Unique agent identifier
    pub id: String,

    /// Operational status as reported by the agent (e.g. "ok", "charging")
    pub reported_status: String,

    /// Battery percentage, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,

    /// Radio signal strength in dBm, -100..=0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio_signal: Option<i32>,

    /// Hardware (MAC) address, sticky once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_address: Option<String>,

    /// Coordinate map (e.g. {"x": .., "y": ..}), opaque to the core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<HashMap<String, f64>>,

    /// Arbitrary sensor readings, opaque to the core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_payload: Option<Value>,

    /// Seconds since the agent booted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

impl StatusReport {
    /// Validates a report before it reaches the registry.
    ///
    /// Checks:
    /// - id is non-empty
    /// - reported_status is non-empty
    /// - battery_level within [0, 100]
    /// - radio_signal within [-100, 0]
    /// - sensor_payload, if present, is a JSON object
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_report(self)
    }
}

/// Peer-to-peer mesh message relayed by an agent for logging and fan-out.
/// The payload is passed through unexamined beyond a shape check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EspNowReport {
    pub sender_mac: String,
    pub receiver_mac: String,
    pub message_type: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

impl EspNowReport {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_esp_now(self)
    }
}
