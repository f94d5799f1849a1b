//! Collaborator contracts consumed by the dispatch engine, with blocking
//! HTTP implementations.
//!
//! The engine only depends on the traits below. [`http`] talks to the
//! inventory, telemetry and command services; [`crate::sim`] provides an
//! in-process stand-in.

pub mod auth;
pub mod command;
pub mod http;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::devices::{Bess, Evcs, Pv, Setup, TimeConfig, V2g};
use crate::error::ClientError;
use crate::telemetry::{BessMeasurement, Protocol, PvMeasurement, TelemetrySample};

pub use auth::{NoAuth, PasswordGrant};
pub use command::{power_command_accepted, set_charging_profile};
pub use http::{HttpCommandChannel, HttpInventory, HttpTelemetry};

/// Device and configuration registry.
pub trait Inventory {
    fn get_setups(&self) -> Result<Vec<Setup>, ClientError>;
    fn get_evcs_by_setup_id(&self, setup_id: u32) -> Result<Vec<Evcs>, ClientError>;
    fn get_bess_by_setup_id(&self, setup_id: u32) -> Result<Vec<Bess>, ClientError>;
    fn get_pv_by_setup_id(&self, setup_id: u32) -> Result<Vec<Pv>, ClientError>;
    fn get_v2g_by_setup_id(&self, setup_id: u32) -> Result<Vec<V2g>, ClientError>;
    fn get_timeconfig(&self, id: u32) -> Result<TimeConfig, ClientError>;
}

/// Latest device readings.
pub trait Telemetry {
    /// Most recent history entry of `attr` for a device, if any was recorded.
    fn latest_sample(
        &self,
        device_id: &str,
        attr: &str,
    ) -> Result<Option<TelemetrySample>, ClientError>;

    fn bess_measurement(&self, device_id: &str) -> Result<BessMeasurement, ClientError>;

    fn pv_measurement(&self, device_id: &str) -> Result<PvMeasurement, ClientError>;
}

/// Remote control of charge points and batteries.
pub trait CommandChannel {
    /// Sends one charging profile. A single attempt; see
    /// [`command::set_charging_profile`] for the retrying wrapper.
    fn set_charging_profile(&self, profile: &ChargingProfile)
        -> Result<CommandResponse, ClientError>;

    /// Sends an active-power set-point (kW) to a battery inverter.
    ///
    /// Negative values discharge into the site, positive values charge.
    fn send_power_command(
        &self,
        device_id: &str,
        power_kw: f64,
    ) -> Result<CommandResponse, ClientError>;
}

/// Supplies the `authorization` field injected into remote payloads.
pub trait TokenSource {
    /// `None` when requests are sent unauthenticated.
    fn token(&self) -> Result<Option<String>, ClientError>;
}

/// Unit of a charging limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    /// Amperes.
    A,
    /// Watts.
    W,
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::W => write!(f, "W"),
        }
    }
}

/// A charging limit for one connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingProfile {
    pub device_id: String,
    pub connector_id: u8,
    pub unit: RateUnit,
    pub limit: f64,
    pub protocol: Protocol,
}

/// Reply of the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
}

impl CommandResponse {
    pub const ACCEPTED: &'static str = "Accepted";

    pub fn accepted() -> Self {
        Self {
            status: Self::ACCEPTED.to_string(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            status: "Rejected".to_string(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == Self::ACCEPTED
    }
}

impl<T: Inventory + ?Sized> Inventory for &T {
    fn get_setups(&self) -> Result<Vec<Setup>, ClientError> {
        (**self).get_setups()
    }
    fn get_evcs_by_setup_id(&self, setup_id: u32) -> Result<Vec<Evcs>, ClientError> {
        (**self).get_evcs_by_setup_id(setup_id)
    }
    fn get_bess_by_setup_id(&self, setup_id: u32) -> Result<Vec<Bess>, ClientError> {
        (**self).get_bess_by_setup_id(setup_id)
    }
    fn get_pv_by_setup_id(&self, setup_id: u32) -> Result<Vec<Pv>, ClientError> {
        (**self).get_pv_by_setup_id(setup_id)
    }
    fn get_v2g_by_setup_id(&self, setup_id: u32) -> Result<Vec<V2g>, ClientError> {
        (**self).get_v2g_by_setup_id(setup_id)
    }
    fn get_timeconfig(&self, id: u32) -> Result<TimeConfig, ClientError> {
        (**self).get_timeconfig(id)
    }
}

impl<T: Telemetry + ?Sized> Telemetry for &T {
    fn latest_sample(
        &self,
        device_id: &str,
        attr: &str,
    ) -> Result<Option<TelemetrySample>, ClientError> {
        (**self).latest_sample(device_id, attr)
    }
    fn bess_measurement(&self, device_id: &str) -> Result<BessMeasurement, ClientError> {
        (**self).bess_measurement(device_id)
    }
    fn pv_measurement(&self, device_id: &str) -> Result<PvMeasurement, ClientError> {
        (**self).pv_measurement(device_id)
    }
}

impl<T: CommandChannel + ?Sized> CommandChannel for &T {
    fn set_charging_profile(
        &self,
        profile: &ChargingProfile,
    ) -> Result<CommandResponse, ClientError> {
        (**self).set_charging_profile(profile)
    }
    fn send_power_command(
        &self,
        device_id: &str,
        power_kw: f64,
    ) -> Result<CommandResponse, ClientError> {
        (**self).send_power_command(device_id, power_kw)
    }
}

impl<T: TokenSource + ?Sized> TokenSource for &T {
    fn token(&self) -> Result<Option<String>, ClientError> {
        (**self).token()
    }
}
