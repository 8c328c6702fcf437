use super::{EspNowReport, StatusReport};
use std::fmt;

/// Validation errors for inbound reports
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingId,
    MissingStatus,
    MissingField(&'static str),
    BatteryOutOfRange(f64),
    SignalOutOfRange(i32),
    PayloadNotObject,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingId => write!(f, "id is required"),
            ValidationError::MissingStatus => write!(f, "reported_status is required"),
            ValidationError::MissingField(name) => write!(f, "{} is required", name),
            ValidationError::BatteryOutOfRange(v) => {
                write!(f, "battery_level must be within [0, 100], got {}", v)
            }
            ValidationError::SignalOutOfRange(v) => {
                write!(f, "radio_signal must be within [-100, 0], got {}", v)
            }
            ValidationError::PayloadNotObject => {
                write!(f, "payload must be a JSON object")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates an agent status report.
///
/// Rejected reports never reach the registry, so a failed validation
/// implies no state mutation occurred.
pub fn validate_report(report: &StatusReport) -> Result<(), ValidationError> {
    if report.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if report.reported_status.is_empty() {
        return Err(ValidationError::MissingStatus);
    }

    if let Some(level) = report.battery_level {
        if !(0.0..=100.0).contains(&level) {
            return Err(ValidationError::BatteryOutOfRange(level));
        }
    }

    if let Some(signal) = report.radio_signal {
        if !(-100..=0).contains(&signal) {
            return Err(ValidationError::SignalOutOfRange(signal));
        }
    }

    if let Some(payload) = &report.sensor_payload {
        if !payload.is_object() {
            return Err(ValidationError::PayloadNotObject);
        }
    }

    Ok(())
}

/// Validates a relayed mesh message report.
pub fn validate_esp_now(report: &EspNowReport) -> Result<(), ValidationError> {
    if report.sender_mac.is_empty() {
        return Err(ValidationError::MissingField("sender_mac"));
    }
    if report.receiver_mac.is_empty() {
        return Err(ValidationError::MissingField("receiver_mac"));
    }
    if report.message_type.is_empty() {
        return Err(ValidationError::MissingField("message_type"));
    }
    if !report.payload.is_object() {
        return Err(ValidationError::PayloadNotObject);
    }

    Ok(())
}
