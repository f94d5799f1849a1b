use serde::{Deserialize, Serialize};

use super::types::{Controllability, de_numeric_id};
use crate::dispatch::window::TimeWindow;
use crate::error::DispatchError;

/// Site-wide envelope shared by all devices behind one connection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    #[serde(deserialize_with = "de_numeric_id")]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// Contracted maximum power (kW).
    #[serde(rename = "Pmax")]
    pub pmax_kw: f64,
    /// Nominal voltage (V).
    #[serde(rename = "Vnom", default)]
    pub vnom_v: f64,
    #[serde(rename = "controllable", default)]
    pub controllability: Controllability,
}

impl Setup {
    pub fn new(id: u32, pmax_kw: f64) -> Self {
        Self {
            id,
            name: format!("setup-{id}"),
            pmax_kw,
            vnom_v: 220.0,
            controllability: Controllability::None,
        }
    }
}

/// Telemetry freshness interval and battery time-of-day windows.
///
/// Window bounds are `HH:MM` strings as stored by the inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Telemetry freshness step (minutes).
    #[serde(default)]
    pub timestep: u32,
    pub tmin_d: String,
    pub tmax_d: String,
    pub tmin_c: String,
    pub tmax_c: String,
}

impl TimeConfig {
    pub fn new(discharge: (&str, &str), charge: (&str, &str)) -> Self {
        Self {
            url: String::new(),
            timestep: 5,
            tmin_d: discharge.0.to_string(),
            tmax_d: discharge.1.to_string(),
            tmin_c: charge.0.to_string(),
            tmax_c: charge.1.to_string(),
        }
    }

    /// Parses both windows, failing on any malformed bound.
    pub fn windows(&self) -> Result<(TimeWindow, TimeWindow), DispatchError> {
        let discharge = TimeWindow::parse(&self.tmin_d, &self.tmax_d)?;
        let charge = TimeWindow::parse(&self.tmin_c, &self.tmax_c)?;
        Ok((discharge, charge))
    }
}
