//! Telemetry samples, protocol detection, and freshness checks.

pub mod protocol;
pub mod sample;

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::debug;

use crate::client::Telemetry;
use crate::devices::{Bess, Pv};

pub use protocol::{Protocol, StatusClass};
pub use sample::{
    BessMeasurement, MEASUREMENT_DATE_FORMAT, PvMeasurement, TelemetrySample, measurement_time,
};

/// History attribute carrying connector status notifications.
pub const STATUS_NOTIFICATION: &str = "statusNotificationReq";
/// History attribute carrying charge point heartbeats.
pub const HEARTBEAT: &str = "heartbeatReq";

/// Result of a freshness-checked telemetry lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    /// Protocol detected from the latest entry, fresh or not.
    pub protocol: Protocol,
    /// The latest entry, when it is recent enough.
    pub sample: Option<TelemetrySample>,
}

fn within(at: DateTime<FixedOffset>, now: DateTime<FixedOffset>, window_minutes: u32) -> bool {
    at >= now - TimeDelta::minutes(i64::from(window_minutes))
}

/// Looks up the latest `attr` entry of a device and keeps it only if it is
/// at most `window_minutes` old.
///
/// Lookup errors are reported as an empty observation.
pub fn check_data<T: Telemetry + ?Sized>(
    telemetry: &T,
    device_id: &str,
    attr: &str,
    window_minutes: u32,
    now: DateTime<FixedOffset>,
) -> Observation {
    let sample = match telemetry.latest_sample(device_id, attr) {
        Ok(Some(sample)) => sample,
        Ok(None) => return Observation::default(),
        Err(e) => {
            debug!(device_id, attr, error = %e, "telemetry lookup failed");
            return Observation::default();
        }
    };

    let protocol = sample.protocol();
    let fresh = within(sample.ts.fixed_offset(), now, window_minutes);
    Observation {
        protocol,
        sample: fresh.then_some(sample),
    }
}

/// Latest battery reading, if one at most `window_minutes` old exists.
pub fn fresh_bess_measurement<T: Telemetry + ?Sized>(
    telemetry: &T,
    bess: &Bess,
    window_minutes: u32,
    now: DateTime<FixedOffset>,
) -> Option<BessMeasurement> {
    let m = telemetry
        .bess_measurement(&bess.id)
        .inspect_err(|e| debug!(device_id = %bess.id, error = %e, "battery measurement unavailable"))
        .ok()?;
    let at = measurement_time(&m.date, now.offset())?;
    within(at, now, window_minutes).then_some(m)
}

/// Latest inverter reading, if one at most `window_minutes` old exists.
pub fn fresh_pv_measurement<T: Telemetry + ?Sized>(
    telemetry: &T,
    pv: &Pv,
    window_minutes: u32,
    now: DateTime<FixedOffset>,
) -> Option<PvMeasurement> {
    let m = telemetry
        .pv_measurement(&pv.id)
        .inspect_err(|e| debug!(device_id = %pv.id, error = %e, "inverter measurement unavailable"))
        .ok()?;
    let at = measurement_time(&m.date, now.offset())?;
    within(at, now, window_minutes).then_some(m)
}
