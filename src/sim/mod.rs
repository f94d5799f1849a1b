//! Seeded simulated microgrid for dry runs and tests.

pub mod microgrid;
pub mod profile;

pub use microgrid::{SimulatedMicrogrid, SimulationParams};
