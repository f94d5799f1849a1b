use serde::{Deserialize, Serialize};

use super::types::de_numeric_id;

/// A battery energy storage system as recorded in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bess {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "de_numeric_id")]
    pub setup_id: u32,
    /// Round-trip efficiency (0.0 to 1.0).
    #[serde(rename = "eff", default = "default_efficiency")]
    pub efficiency: f64,
    /// Nameplate charge/discharge power (kW).
    #[serde(rename = "Pmax")]
    pub pmax_kw: f64,
    /// Usable energy capacity (kWh).
    #[serde(rename = "Emax")]
    pub emax_kwh: f64,
}

fn default_efficiency() -> f64 {
    1.0
}

impl Bess {
    pub fn new(id: &str, setup_id: u32, pmax_kw: f64, emax_kwh: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            setup_id,
            efficiency: 1.0,
            pmax_kw,
            emax_kwh,
        }
    }

    /// Energy the battery must be able to deliver at full power over one
    /// dispatch interval (kWh).
    pub fn interval_demand_kwh(&self, interval_minutes: f64) -> f64 {
        (interval_minutes / 60.0) * self.pmax_kw
    }
}
