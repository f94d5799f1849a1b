use serde::{Deserialize, Serialize};

use super::types::{Connector, ConnectorType, ControlUnit, de_numeric_id};

/// A charge point (EVCS or V2G unit) with one to three connectors.
///
/// Inventory records carry connector attributes as flat `conn{n}_*` fields;
/// only the first `nconn` are read, anything beyond is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChargePointRecord")]
pub struct ChargePoint {
    pub id: String,
    pub name: String,
    pub setup_id: u32,
    pub control: ControlUnit,
    pub connectors: Vec<Connector>,
}

/// EV charging station.
pub type Evcs = ChargePoint;
/// Vehicle-to-grid unit; same connector shape as an EVCS.
pub type V2g = ChargePoint;

impl ChargePoint {
    /// Maximum number of connectors a station may declare.
    pub const MAX_CONNECTORS: usize = 3;

    pub fn new(id: &str, setup_id: u32, control: ControlUnit, connectors: Vec<Connector>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            setup_id,
            control,
            connectors,
        }
    }

    /// Sum of connector nameplate power (kW).
    pub fn nameplate_kw(&self) -> f64 {
        self.connectors.iter().map(|c| c.pmax_kw).sum()
    }

    /// Connector id used on the command channel.
    ///
    /// Single-connector stations are addressed as a whole (`0`);
    /// multi-connector stations by 1-based connector index.
    pub fn connector_id(&self, connector: &Connector) -> u8 {
        if self.connectors.len() == 1 {
            0
        } else {
            connector.index
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChargePointRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "de_numeric_id")]
    setup_id: u32,
    nconn: u8,
    #[serde(default)]
    control: ControlUnit,
    conn1_type: Option<ConnectorType>,
    #[serde(rename = "conn1_Pmax")]
    conn1_pmax: Option<f64>,
    #[serde(rename = "conn1_Vnom")]
    conn1_vnom: Option<f64>,
    #[serde(rename = "conn1_Imax")]
    conn1_imax: Option<f64>,
    conn2_type: Option<ConnectorType>,
    #[serde(rename = "conn2_Pmax")]
    conn2_pmax: Option<f64>,
    #[serde(rename = "conn2_Vnom")]
    conn2_vnom: Option<f64>,
    #[serde(rename = "conn2_Imax")]
    conn2_imax: Option<f64>,
    conn3_type: Option<ConnectorType>,
    #[serde(rename = "conn3_Pmax")]
    conn3_pmax: Option<f64>,
    #[serde(rename = "conn3_Vnom")]
    conn3_vnom: Option<f64>,
    #[serde(rename = "conn3_Imax")]
    conn3_imax: Option<f64>,
}

impl TryFrom<ChargePointRecord> for ChargePoint {
    type Error = String;

    fn try_from(r: ChargePointRecord) -> Result<Self, Self::Error> {
        let nconn = usize::from(r.nconn);
        if !(1..=ChargePoint::MAX_CONNECTORS).contains(&nconn) {
            return Err(format!("station {}: nconn must be 1..=3, got {}", r.id, r.nconn));
        }

        let slots = [
            (r.conn1_type, r.conn1_pmax, r.conn1_vnom, r.conn1_imax),
            (r.conn2_type, r.conn2_pmax, r.conn2_vnom, r.conn2_imax),
            (r.conn3_type, r.conn3_pmax, r.conn3_vnom, r.conn3_imax),
        ];

        let mut connectors = Vec::with_capacity(nconn);
        for (i, (kind, pmax, vnom, imax)) in slots.into_iter().take(nconn).enumerate() {
            let index = u8::try_from(i + 1).unwrap_or(u8::MAX);
            let pmax_kw = pmax.ok_or_else(|| {
                format!("station {}: connector {index} has no Pmax", r.id)
            })?;
            if pmax_kw < 0.0 {
                return Err(format!("station {}: connector {index} Pmax is negative", r.id));
            }
            connectors.push(Connector {
                index,
                kind,
                pmax_kw,
                vnom_v: vnom,
                imax_a: imax,
            });
        }

        let name = if r.name.is_empty() { r.id.clone() } else { r.name };
        Ok(Self {
            id: r.id,
            name,
            setup_id: r.setup_id,
            control: r.control,
            connectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_connector_record() {
        let json = r#"{
            "id": "7415ca", "name": "ABBTACW745020G0166", "setup_id": 3,
            "nconn": 1, "control": "current",
            "conn1_type": "DC", "conn1_Pmax": 50, "conn1_Vnom": 220, "conn1_Imax": 125
        }"#;
        let cp: ChargePoint = serde_json::from_str(json).unwrap();
        assert_eq!(cp.connectors.len(), 1);
        assert_eq!(cp.control, ControlUnit::Current);
        assert_eq!(cp.connectors[0].pmax_kw, 50.0);
        assert_eq!(cp.connectors[0].vnom_v, Some(220.0));
        assert_eq!(cp.connectors[0].kind, Some(ConnectorType::Dc));
        assert_eq!(cp.connector_id(&cp.connectors[0]), 0);
    }

    #[test]
    fn ignores_attributes_beyond_nconn() {
        let json = r#"{
            "id": "a", "setup_id": "1", "nconn": 2, "control": "power",
            "conn1_Pmax": 22, "conn2_Pmax": 7.4, "conn3_Pmax": 150
        }"#;
        let cp: ChargePoint = serde_json::from_str(json).unwrap();
        assert_eq!(cp.connectors.len(), 2);
        assert!((cp.nameplate_kw() - 29.4).abs() < 1e-9);
        assert_eq!(cp.connector_id(&cp.connectors[1]), 2);
        assert_eq!(cp.name, "a");
    }

    #[test]
    fn rejects_missing_pmax_within_nconn() {
        let json = r#"{"id": "a", "setup_id": 1, "nconn": 2, "conn1_Pmax": 22}"#;
        let r: Result<ChargePoint, _> = serde_json::from_str(json);
        assert!(r.is_err());
    }

    #[test]
    fn rejects_out_of_range_nconn() {
        let json = r#"{"id": "a", "setup_id": 1, "nconn": 4, "conn1_Pmax": 22}"#;
        let r: Result<ChargePoint, _> = serde_json::from_str(json);
        assert!(r.is_err());
    }
}
