//! Inventory data model: setups, charge points, batteries, and inverters.

/// Battery energy storage record.
pub mod battery;
/// EV charging station and V2G record.
pub mod ev_charger;
pub mod setup;
/// Photovoltaic inverter record.
pub mod solar;
pub mod types;

pub use battery::Bess;
pub use ev_charger::{ChargePoint, Evcs, V2g};
pub use setup::{Setup, TimeConfig};
pub use solar::Pv;
pub use types::{Connector, ConnectorType, ControlUnit, Controllability};
