//! Power dispatch for microgrids of EV chargers, batteries, and PV inverters.

pub mod cli;
pub mod client;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod sim;
pub mod telemetry;
