//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde_json::{Value, json};

use der_dispatch::client::{ChargingProfile, CommandChannel, CommandResponse, Inventory, Telemetry};
use der_dispatch::devices::{Bess, Evcs, Pv, Setup, TimeConfig, V2g};
use der_dispatch::dispatch::{DispatchSettings, FixedClock};
use der_dispatch::error::ClientError;
use der_dispatch::telemetry::{
    BessMeasurement, HEARTBEAT, MEASUREMENT_DATE_FORMAT, PvMeasurement, STATUS_NOTIFICATION,
    TelemetrySample,
};

/// Local instant used by every scenario, on 2025-01-28 at UTC-3.
pub fn at(hh_mm: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(&format!("2025-01-28T{hh_mm}:00-03:00")).unwrap()
}

pub fn clock(hh_mm: &str) -> FixedClock {
    FixedClock::new(at(hh_mm))
}

/// Default settings without the per-station pause.
pub fn settings() -> DispatchSettings {
    DispatchSettings {
        throttle: Duration::ZERO,
        ..DispatchSettings::default()
    }
}

/// Discharge 18:00-21:00, charge 03:00-05:00.
pub fn default_timeconfig() -> TimeConfig {
    TimeConfig::new(("18:00", "21:00"), ("03:00", "05:00"))
}

/// In-memory inventory.
#[derive(Default)]
pub struct Fleet {
    pub setups: Vec<Setup>,
    pub evcs: Vec<Evcs>,
    pub bess: Vec<Bess>,
    pub pv: Vec<Pv>,
    pub v2g: Vec<V2g>,
    pub timeconfig: Option<TimeConfig>,
    pub fail_setups: bool,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            timeconfig: Some(default_timeconfig()),
            ..Self::default()
        }
    }
}

impl Inventory for Fleet {
    fn get_setups(&self) -> Result<Vec<Setup>, ClientError> {
        if self.fail_setups {
            return Err(ClientError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.setups.clone())
    }

    fn get_evcs_by_setup_id(&self, setup_id: u32) -> Result<Vec<Evcs>, ClientError> {
        Ok(self.evcs.iter().filter(|d| d.setup_id == setup_id).cloned().collect())
    }

    fn get_bess_by_setup_id(&self, setup_id: u32) -> Result<Vec<Bess>, ClientError> {
        Ok(self.bess.iter().filter(|d| d.setup_id == setup_id).cloned().collect())
    }

    fn get_pv_by_setup_id(&self, setup_id: u32) -> Result<Vec<Pv>, ClientError> {
        Ok(self.pv.iter().filter(|d| d.setup_id == setup_id).cloned().collect())
    }

    fn get_v2g_by_setup_id(&self, setup_id: u32) -> Result<Vec<V2g>, ClientError> {
        Ok(self.v2g.iter().filter(|d| d.setup_id == setup_id).cloned().collect())
    }

    fn get_timeconfig(&self, id: u32) -> Result<TimeConfig, ClientError> {
        self.timeconfig
            .clone()
            .ok_or_else(|| ClientError::NotFound(format!("timeconfig {id}")))
    }
}

/// In-memory device history and measurements, all one minute old.
pub struct History {
    now: DateTime<FixedOffset>,
    samples: HashMap<(String, &'static str), Value>,
    soc: HashMap<String, f64>,
    pv_w: HashMap<String, f64>,
}

impl History {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now,
            samples: HashMap::new(),
            soc: HashMap::new(),
            pv_w: HashMap::new(),
        }
    }

    /// OCPP 1.6 status notification.
    pub fn status(mut self, device_id: &str, status: &str) -> Self {
        self.samples.insert(
            (device_id.to_string(), STATUS_NOTIFICATION),
            json!({"version": "16", "status": status}),
        );
        self
    }

    /// OCPP 2.0.1 heartbeat.
    pub fn heartbeat(mut self, device_id: &str) -> Self {
        self.samples.insert(
            (device_id.to_string(), HEARTBEAT),
            json!({"version": "201"}),
        );
        self
    }

    /// State of charge in percent.
    pub fn soc(mut self, device_id: &str, percent: f64) -> Self {
        self.soc.insert(device_id.to_string(), percent);
        self
    }

    pub fn pv_watts(mut self, device_id: &str, watts: f64) -> Self {
        self.pv_w.insert(device_id.to_string(), watts);
        self
    }

    fn recent_date(&self) -> String {
        (self.now - TimeDelta::minutes(1))
            .naive_local()
            .format(MEASUREMENT_DATE_FORMAT)
            .to_string()
    }
}

impl Telemetry for History {
    fn latest_sample(
        &self,
        device_id: &str,
        attr: &str,
    ) -> Result<Option<TelemetrySample>, ClientError> {
        let key = (device_id.to_string(), if attr == HEARTBEAT { HEARTBEAT } else { STATUS_NOTIFICATION });
        Ok(self.samples.get(&key).map(|value| TelemetrySample {
            device_id: device_id.to_string(),
            attr: attr.to_string(),
            ts: (self.now - TimeDelta::minutes(1)).with_timezone(&Utc),
            value: value.clone(),
        }))
    }

    fn bess_measurement(&self, device_id: &str) -> Result<BessMeasurement, ClientError> {
        let level = self
            .soc
            .get(device_id)
            .ok_or_else(|| ClientError::NotFound(device_id.to_string()))?;
        Ok(BessMeasurement {
            date: self.recent_date(),
            battery_level: *level,
        })
    }

    fn pv_measurement(&self, device_id: &str) -> Result<PvMeasurement, ClientError> {
        let w = self
            .pv_w
            .get(device_id)
            .ok_or_else(|| ClientError::NotFound(device_id.to_string()))?;
        Ok(PvMeasurement {
            date: self.recent_date(),
            total_dc_power_w: *w,
        })
    }
}

/// Command channel that records every call and rejects listed devices.
#[derive(Default)]
pub struct Recorder {
    pub profiles: RefCell<Vec<ChargingProfile>>,
    pub battery: RefCell<Vec<(String, f64)>>,
    pub rejected: HashSet<String>,
    pub calls: Cell<usize>,
}

impl Recorder {
    pub fn rejecting(devices: &[&str]) -> Self {
        Self {
            rejected: devices.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    fn reply(&self, device_id: &str) -> CommandResponse {
        self.calls.set(self.calls.get() + 1);
        if self.rejected.contains(device_id) {
            CommandResponse::rejected()
        } else {
            CommandResponse::accepted()
        }
    }
}

impl CommandChannel for Recorder {
    fn set_charging_profile(
        &self,
        profile: &ChargingProfile,
    ) -> Result<CommandResponse, ClientError> {
        self.profiles.borrow_mut().push(profile.clone());
        Ok(self.reply(&profile.device_id))
    }

    fn send_power_command(
        &self,
        device_id: &str,
        power_kw: f64,
    ) -> Result<CommandResponse, ClientError> {
        self.battery.borrow_mut().push((device_id.to_string(), power_kw));
        Ok(self.reply(device_id))
    }
}
