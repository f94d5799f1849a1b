use std::cell::RefCell;

use chrono::{TimeDelta, Timelike, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

use super::profile::{daylight_frac, gaussian_noise};
use crate::client::{ChargingProfile, CommandChannel, CommandResponse, Inventory, Telemetry};
use crate::devices::{
    Bess, ChargePoint, Connector, ControlUnit, Evcs, Pv, Setup, TimeConfig, V2g,
};
use crate::dispatch::Clock;
use crate::error::ClientError;
use crate::telemetry::{
    BessMeasurement, HEARTBEAT, MEASUREMENT_DATE_FORMAT, PvMeasurement, STATUS_NOTIFICATION,
    TelemetrySample,
};

const CHARGING_STATUSES: &[&str] = &["Preparing", "Charging", "Reserved"];
const IDLE_STATUSES: &[&str] = &["Available", "Finishing", "SuspendedEV", "SuspendedEVSE"];

/// Behaviour knobs of the simulated field devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Chance a station reports a fresh status.
    pub status_probability: f64,
    /// Chance a fresh status is a charging one.
    pub charging_probability: f64,
    /// Chance a station without fresh status still sends a heartbeat.
    pub heartbeat_probability: f64,
    /// Chance any command is rejected.
    pub reject_probability: f64,
    /// Mean battery state of charge (percent).
    pub soc_mean: f64,
    /// Standard deviation of the state of charge (percent).
    pub soc_std: f64,
    /// Relative noise on PV output.
    pub pv_noise_std: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            status_probability: 0.8,
            charging_probability: 0.6,
            heartbeat_probability: 0.5,
            reject_probability: 0.1,
            soc_mean: 55.0,
            soc_std: 25.0,
            pv_noise_std: 0.1,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
        }
    }
}

/// In-process microgrid that answers as the inventory, telemetry and
/// command services would.
///
/// Every reading and command outcome is drawn from a seeded RNG, so a run
/// is reproducible for a given seed and clock.
pub struct SimulatedMicrogrid<K> {
    clock: K,
    params: SimulationParams,
    setups: Vec<Setup>,
    evcs: Vec<Evcs>,
    bess: Vec<Bess>,
    pv: Vec<Pv>,
    v2g: Vec<V2g>,
    timeconfig: Option<TimeConfig>,
    rng: RefCell<StdRng>,
}

impl<K: Clock> SimulatedMicrogrid<K> {
    /// Creates an empty microgrid with default windows (discharge
    /// 18:00-21:00, charge 03:00-05:00).
    ///
    /// # Arguments
    ///
    /// * `seed` - Random seed for reproducible readings and outcomes
    /// * `clock` - Time source used to stamp readings
    pub fn new(seed: u64, clock: K) -> Self {
        Self {
            clock,
            params: SimulationParams::default(),
            setups: Vec::new(),
            evcs: Vec::new(),
            bess: Vec::new(),
            pv: Vec::new(),
            v2g: Vec::new(),
            timeconfig: Some(TimeConfig::new(("18:00", "21:00"), ("03:00", "05:00"))),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Two setups with a mix of stations, storage and generation.
    pub fn demo(seed: u64, clock: K) -> Self {
        let conn = |i, p| Connector::new(i, p, 220.0);
        Self::new(seed, clock)
            .with_setup(Setup::new(1, 70.0))
            .with_setup(Setup::new(2, 50.0))
            .with_evcs(ChargePoint::new("evcs-1a", 1, ControlUnit::Current, vec![conn(1, 22.0)]))
            .with_evcs(ChargePoint::new(
                "evcs-1b",
                1,
                ControlUnit::Power,
                vec![conn(1, 7.4), conn(2, 7.4)],
            ))
            .with_evcs(ChargePoint::new("evcs-1c", 1, ControlUnit::Power, vec![conn(1, 50.0)]))
            .with_evcs(ChargePoint::new("evcs-2a", 2, ControlUnit::Current, vec![conn(1, 11.0)]))
            .with_evcs(ChargePoint::new(
                "evcs-2b",
                2,
                ControlUnit::Current,
                vec![conn(1, 22.0), conn(2, 22.0), conn(3, 22.0)],
            ))
            .with_bess(Bess::new("bess-1", 1, 30.0, 60.0))
            .with_bess(Bess::new("bess-2", 2, 15.0, 30.0))
            .with_pv(Pv::new("pv-1", 1, 20.0))
            .with_v2g(ChargePoint::new("v2g-1", 1, ControlUnit::Power, vec![conn(1, 11.0)]))
    }

    pub fn with_params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_setup(mut self, setup: Setup) -> Self {
        self.setups.push(setup);
        self
    }

    pub fn with_evcs(mut self, evcs: Evcs) -> Self {
        self.evcs.push(evcs);
        self
    }

    pub fn with_bess(mut self, bess: Bess) -> Self {
        self.bess.push(bess);
        self
    }

    pub fn with_pv(mut self, pv: Pv) -> Self {
        self.pv.push(pv);
        self
    }

    pub fn with_v2g(mut self, v2g: V2g) -> Self {
        self.v2g.push(v2g);
        self
    }

    /// Replaces the time configuration; `None` makes lookups fail.
    pub fn with_timeconfig(mut self, timeconfig: Option<TimeConfig>) -> Self {
        self.timeconfig = timeconfig;
        self
    }

    fn roll(&self, probability: f64) -> bool {
        self.rng.borrow_mut().random_bool(probability.clamp(0.0, 1.0))
    }

    fn pick(&self, choices: &[&'static str]) -> &'static str {
        let i = self.rng.borrow_mut().random_range(0..choices.len());
        choices[i]
    }

    fn measurement_date(&self, max_age_minutes: i64) -> String {
        let age = self.rng.borrow_mut().random_range(0..=max_age_minutes);
        (self.clock.now() - TimeDelta::minutes(age))
            .naive_local()
            .format(MEASUREMENT_DATE_FORMAT)
            .to_string()
    }

    fn respond(&self) -> CommandResponse {
        if self.roll(self.params.reject_probability) {
            CommandResponse::rejected()
        } else {
            CommandResponse::accepted()
        }
    }
}

/// OCPP version reported by a station, stable per device id.
fn version_of(device_id: &str) -> &'static str {
    if device_id.bytes().map(u32::from).sum::<u32>() % 2 == 0 {
        "16"
    } else {
        "201"
    }
}

fn by_setup<T: Clone>(items: &[T], setup_id: u32, of: impl Fn(&T) -> u32) -> Vec<T> {
    items.iter().filter(|d| of(d) == setup_id).cloned().collect()
}

impl<K: Clock> Inventory for SimulatedMicrogrid<K> {
    fn get_setups(&self) -> Result<Vec<Setup>, ClientError> {
        Ok(self.setups.clone())
    }

    fn get_evcs_by_setup_id(&self, setup_id: u32) -> Result<Vec<Evcs>, ClientError> {
        Ok(by_setup(&self.evcs, setup_id, |d| d.setup_id))
    }

    fn get_bess_by_setup_id(&self, setup_id: u32) -> Result<Vec<Bess>, ClientError> {
        Ok(by_setup(&self.bess, setup_id, |d| d.setup_id))
    }

    fn get_pv_by_setup_id(&self, setup_id: u32) -> Result<Vec<Pv>, ClientError> {
        Ok(by_setup(&self.pv, setup_id, |d| d.setup_id))
    }

    fn get_v2g_by_setup_id(&self, setup_id: u32) -> Result<Vec<V2g>, ClientError> {
        Ok(by_setup(&self.v2g, setup_id, |d| d.setup_id))
    }

    fn get_timeconfig(&self, id: u32) -> Result<TimeConfig, ClientError> {
        self.timeconfig
            .clone()
            .ok_or_else(|| ClientError::NotFound(format!("timeconfig {id}")))
    }
}

impl<K: Clock> Telemetry for SimulatedMicrogrid<K> {
    fn latest_sample(
        &self,
        device_id: &str,
        attr: &str,
    ) -> Result<Option<TelemetrySample>, ClientError> {
        let version = version_of(device_id);
        let now = self.clock.now().with_timezone(&Utc);
        let p = &self.params;

        let (age_minutes, value) = match attr {
            STATUS_NOTIFICATION => {
                let status = if self.roll(p.charging_probability) {
                    self.pick(CHARGING_STATUSES)
                } else {
                    self.pick(IDLE_STATUSES)
                };
                let field = if version == "201" { "connectorStatus" } else { "status" };
                // a missed notification shows up as a day-old entry
                let age = if self.roll(p.status_probability) { 1 } else { 24 * 60 };
                (age, json!({ "version": version, field: status }))
            }
            HEARTBEAT => {
                if !self.roll(p.heartbeat_probability) {
                    return Ok(None);
                }
                (1, json!({ "version": version, "command": "Heartbeat" }))
            }
            _ => return Ok(None),
        };

        Ok(Some(TelemetrySample {
            device_id: device_id.to_string(),
            attr: attr.to_string(),
            ts: now - TimeDelta::minutes(age_minutes),
            value,
        }))
    }

    fn bess_measurement(&self, _device_id: &str) -> Result<BessMeasurement, ClientError> {
        let noise = gaussian_noise(&mut self.rng.borrow_mut(), self.params.soc_std);
        Ok(BessMeasurement {
            date: self.measurement_date(3),
            battery_level: (self.params.soc_mean + noise).clamp(0.0, 100.0),
        })
    }

    fn pv_measurement(&self, device_id: &str) -> Result<PvMeasurement, ClientError> {
        let pv = self
            .pv
            .iter()
            .find(|p| p.id == device_id)
            .ok_or_else(|| ClientError::NotFound(device_id.to_string()))?;

        let now = self.clock.now();
        let hour = f64::from(now.hour()) + f64::from(now.minute()) / 60.0;
        let frac = daylight_frac(hour, self.params.sunrise_hour, self.params.sunset_hour);
        let noise = 1.0 + gaussian_noise(&mut self.rng.borrow_mut(), self.params.pv_noise_std);
        Ok(PvMeasurement {
            date: self.measurement_date(5),
            total_dc_power_w: (pv.pmax_kw * frac * noise).max(0.0) * 1000.0,
        })
    }
}

impl<K: Clock> CommandChannel for SimulatedMicrogrid<K> {
    fn set_charging_profile(
        &self,
        _profile: &ChargingProfile,
    ) -> Result<CommandResponse, ClientError> {
        Ok(self.respond())
    }

    fn send_power_command(
        &self,
        _device_id: &str,
        _power_kw: f64,
    ) -> Result<CommandResponse, ClientError> {
        Ok(self.respond())
    }
}
