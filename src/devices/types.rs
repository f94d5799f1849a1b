//! Shared connector shape and enumerations used by inventory records.

use serde::{Deserialize, Deserializer, Serialize};

/// How a charge point accepts set-points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlUnit {
    /// Limit expressed in amperes (`A`), derived from nominal voltage.
    Current,
    /// Limit expressed in watts (`W`).
    Power,
    /// Not controllable.
    #[default]
    None,
}

/// Connector electrical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorType {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
}

/// Site controllability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Controllability {
    #[default]
    None,
    Hourly,
    Voltage,
}

/// One connector of a charge point, with its nameplate ratings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connector {
    /// 1-based position on the station.
    pub index: u8,
    pub kind: Option<ConnectorType>,
    /// Nameplate power (kW).
    pub pmax_kw: f64,
    /// Nominal voltage (V).
    pub vnom_v: Option<f64>,
    /// Nameplate current (A).
    pub imax_a: Option<f64>,
}

impl Connector {
    pub fn new(index: u8, pmax_kw: f64, vnom_v: f64) -> Self {
        Self {
            index,
            kind: None,
            pmax_kw,
            vnom_v: Some(vnom_v),
            imax_a: None,
        }
    }
}

/// Accepts identifiers serialized either as JSON numbers or numeric strings.
pub(crate) fn de_numeric_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
