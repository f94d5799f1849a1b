//! Per-setup state for the duration of one dispatch cycle.

use crate::client::Inventory;
use crate::devices::{Bess, Evcs, Pv, Setup, V2g};
use crate::error::{ClientError, DispatchError};
use crate::telemetry::Protocol;

/// Station classification derived from telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Charging,
    Available,
    Unavailable,
}

/// A station together with what telemetry said about it this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StationState {
    pub station: Evcs,
    pub protocol: Protocol,
    pub availability: Availability,
}

/// Running power figures of a setup (kW).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerBudget {
    /// Contracted site limit.
    pub nominal_kw: f64,
    /// Dispatchable power still unassigned.
    pub total_kw: f64,
    /// Fresh PV generation.
    pub pv_kw: f64,
    /// Power allocated to charging stations.
    pub ev_kw: f64,
}

impl PowerBudget {
    pub fn new(nominal_kw: f64) -> Self {
        Self {
            nominal_kw,
            total_kw: nominal_kw,
            pv_kw: 0.0,
            ev_kw: 0.0,
        }
    }

    /// Removes `kw` from the dispatchable total without going below zero.
    pub fn withdraw_clamped(&mut self, kw: f64) {
        self.total_kw = (self.total_kw - kw).max(0.0);
    }
}

/// Batteries grouped by state of charge.
///
/// A battery is either to-charge or to-discharge, and may additionally be
/// half-charged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryGroups {
    pub to_charge: Vec<Bess>,
    pub to_discharge: Vec<Bess>,
    pub half_charged: Vec<Bess>,
}

/// Devices and running state of one setup during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteModel {
    pub setup: Setup,
    pub evcs: Vec<Evcs>,
    pub bess: Vec<Bess>,
    pub pv: Vec<Pv>,
    pub v2g: Vec<V2g>,
    /// Filled by the availability classifier.
    pub stations: Vec<StationState>,
    /// Filled by the budget calculator.
    pub batteries: BatteryGroups,
    pub budget: PowerBudget,
}

impl SiteModel {
    pub fn new(setup: Setup) -> Self {
        let budget = PowerBudget::new(setup.pmax_kw);
        Self {
            setup,
            evcs: Vec::new(),
            bess: Vec::new(),
            pv: Vec::new(),
            v2g: Vec::new(),
            stations: Vec::new(),
            batteries: BatteryGroups::default(),
            budget,
        }
    }

    /// Fetches every device of the setup. Any failed listing fails the load.
    pub fn load<I: Inventory + ?Sized>(inventory: &I, setup: &Setup) -> Result<Self, DispatchError> {
        let id = setup.id;
        let inv = |what: &'static str| move |source: ClientError| DispatchError::Inventory { what, source };

        let mut site = Self::new(setup.clone());
        site.evcs = inventory.get_evcs_by_setup_id(id).map_err(inv("evcs"))?;
        site.bess = inventory.get_bess_by_setup_id(id).map_err(inv("bess"))?;
        site.pv = inventory.get_pv_by_setup_id(id).map_err(inv("pv"))?;
        site.v2g = inventory.get_v2g_by_setup_id(id).map_err(inv("v2g"))?;
        Ok(site)
    }

    pub fn with_availability(
        &self,
        availability: Availability,
    ) -> impl Iterator<Item = &StationState> {
        self.stations
            .iter()
            .filter(move |s| s.availability == availability)
    }

    pub fn count(&self, availability: Availability) -> usize {
        self.with_availability(availability).count()
    }
}
