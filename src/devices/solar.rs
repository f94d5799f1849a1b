use serde::{Deserialize, Serialize};

use super::types::de_numeric_id;

/// A photovoltaic inverter as recorded in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pv {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "de_numeric_id")]
    pub setup_id: u32,
    #[serde(rename = "eff", default)]
    pub efficiency: f64,
    /// Nameplate output (kW).
    #[serde(rename = "Pmax")]
    pub pmax_kw: f64,
}

impl Pv {
    pub fn new(id: &str, setup_id: u32, pmax_kw: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            setup_id,
            efficiency: 1.0,
            pmax_kw,
        }
    }
}
