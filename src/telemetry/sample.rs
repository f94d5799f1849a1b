use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::Protocol;

/// One entry of the device history service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: String,
    pub attr: String,
    pub ts: DateTime<Utc>,
    /// Protocol-tagged payload as reported by the charge point.
    pub value: Value,
}

impl TelemetrySample {
    pub fn protocol(&self) -> Protocol {
        Protocol::detect(&self.value)
    }

    /// Connector status literal, read through the protocol's field name.
    pub fn status(&self) -> Option<&str> {
        self.protocol().status(&self.value)
    }
}

/// Timestamp format of battery and inverter measurements (local, no offset).
pub const MEASUREMENT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Latest reading of a battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BessMeasurement {
    pub date: String,
    /// State of charge (percent).
    pub battery_level: f64,
}

/// Latest reading of a PV inverter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvMeasurement {
    pub date: String,
    /// DC generation (W).
    #[serde(rename = "total_DC_power")]
    pub total_dc_power_w: f64,
}

impl BessMeasurement {
    /// State of charge as a fraction.
    pub fn soc(&self) -> f64 {
        self.battery_level / 100.0
    }
}

impl PvMeasurement {
    pub fn generation_kw(&self) -> f64 {
        self.total_dc_power_w / 1000.0
    }
}

/// Interprets a naive measurement date as local time at `offset`.
///
/// Returns `None` when the date does not parse.
pub fn measurement_time(date: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(date.trim(), MEASUREMENT_DATE_FORMAT).ok()?;
    offset.from_local_datetime(&naive).single()
}
