//! Station availability from status notifications and heartbeats.

use std::thread;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use super::site::{Availability, SiteModel, StationState};
use super::types::DispatchSettings;
use crate::client::Telemetry;
use crate::devices::Evcs;
use crate::telemetry::{HEARTBEAT, Protocol, STATUS_NOTIFICATION, StatusClass, check_data};

/// Classifies every station of the site as charging, available or
/// unavailable.
///
/// A fresh status notification decides directly. Without one (or with an
/// unrecognized status) a fresh heartbeat marks the station available, and
/// no heartbeat marks it unavailable. With safety mode on, an unavailable
/// station's nameplate is removed from the budget, never below zero.
///
/// # Arguments
///
/// * `site` - Site whose `evcs` are classified into `stations`
/// * `telemetry` - Device history source; errors count as missing data
/// * `settings` - Freshness windows, safety mode and throttle
/// * `now` - Reference time for freshness
pub fn classify_stations<T: Telemetry + ?Sized>(
    site: &mut SiteModel,
    telemetry: &T,
    settings: &DispatchSettings,
    now: DateTime<FixedOffset>,
) {
    site.stations = Vec::with_capacity(site.evcs.len());

    for station in &site.evcs {
        let state = classify_one(station.clone(), telemetry, settings, now);

        if state.availability == Availability::Unavailable {
            warn!(
                setup_id = site.setup.id,
                device_id = %state.station.id,
                "station is not sending data"
            );
            if settings.safety_mode {
                site.budget.withdraw_clamped(state.station.nameplate_kw());
            }
        }

        debug!(
            setup_id = site.setup.id,
            device_id = %state.station.id,
            availability = ?state.availability,
            protocol = %state.protocol,
            "station classified"
        );
        site.stations.push(state);

        if !settings.throttle.is_zero() {
            thread::sleep(settings.throttle);
        }
    }
}

fn classify_one<T: Telemetry + ?Sized>(
    station: Evcs,
    telemetry: &T,
    settings: &DispatchSettings,
    now: DateTime<FixedOffset>,
) -> StationState {
    let status = check_data(telemetry, &station.id, STATUS_NOTIFICATION, settings.status_minutes, now);
    let class = status
        .sample
        .as_ref()
        .and_then(|s| s.status())
        .and_then(StatusClass::from_status);

    if let Some(class) = class {
        let availability = match class {
            StatusClass::Charging => Availability::Charging,
            StatusClass::Idle => Availability::Available,
        };
        return StationState {
            station,
            protocol: status.protocol,
            availability,
        };
    }

    let heartbeat = check_data(telemetry, &station.id, HEARTBEAT, settings.heartbeat_minutes, now);
    let protocol = match status.protocol {
        Protocol::Unknown => heartbeat.protocol,
        known => known,
    };
    let availability = if heartbeat.sample.is_some() {
        Availability::Available
    } else {
        Availability::Unavailable
    };
    StationState {
        station,
        protocol,
        availability,
    }
}
