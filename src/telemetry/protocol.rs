//! OCPP protocol detection and status-field resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OCPP protocol version a charge point reports in its payload `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "OCPP 1.6")]
    Ocpp16,
    #[serde(rename = "OCPP 2.0.1")]
    Ocpp201,
    #[default]
    Unknown,
}

/// Protocol tag -> payload field carrying the connector status.
///
/// Unknown payloads are read with the OCPP 1.6 field name.
const STATUS_FIELDS: &[(Protocol, &str)] = &[
    (Protocol::Ocpp16, "status"),
    (Protocol::Ocpp201, "connectorStatus"),
    (Protocol::Unknown, "status"),
];

impl Protocol {
    /// Detects the protocol from the `version` field of a telemetry payload.
    pub fn from_version(version: Option<&str>) -> Self {
        match version {
            Some("201") => Self::Ocpp201,
            Some("16") => Self::Ocpp16,
            _ => Self::Unknown,
        }
    }

    /// Detects the protocol of a telemetry payload.
    pub fn detect(value: &Value) -> Self {
        Self::from_version(value.get("version").and_then(Value::as_str))
    }

    /// Name sent as `ocppProtocolVersion` on the command channel.
    ///
    /// Unknown protocols are addressed as OCPP 1.6.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocpp201 => "OCPP 2.0.1",
            Self::Ocpp16 | Self::Unknown => "OCPP 1.6",
        }
    }

    /// Payload field holding the connector status for this protocol.
    pub fn status_field(&self) -> &'static str {
        STATUS_FIELDS
            .iter()
            .find(|(p, _)| p == self)
            .map(|(_, field)| *field)
            .unwrap_or("status")
    }

    /// Reads the connector status literal out of a payload.
    pub fn status<'a>(&self, value: &'a Value) -> Option<&'a str> {
        value.get(self.status_field()).and_then(Value::as_str)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// What a reported connector status says about a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// A vehicle is drawing, or about to draw, power.
    Charging,
    /// The station answers but no vehicle is drawing power.
    Idle,
}

const CHARGING: &[&str] = &["Preparing", "Charging", "Reserved"];
const IDLE: &[&str] = &[
    "Available",
    "Finishing",
    "Unavailable",
    "Faulted",
    "SuspendedEV",
    "SuspendedEVSE",
];

impl StatusClass {
    /// Classifies a status literal, or `None` if it is not recognized.
    pub fn from_status(status: &str) -> Option<Self> {
        if CHARGING.contains(&status) {
            Some(Self::Charging)
        } else if IDLE.contains(&status) {
            Some(Self::Idle)
        } else {
            None
        }
    }
}
