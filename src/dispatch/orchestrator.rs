//! Dispatch cycle over every setup, with a safe fallback per setup.

use std::collections::HashMap;

use tracing::{error, info, warn};

use super::allocation::{BatteryWindows, CommandIssuer, KEEP_ALIVE_KW, Setpoint, allocate, floor_kw};
use super::availability::classify_stations;
use super::budget::compute_budget;
use super::clock::Clock;
use super::site::{Availability, SiteModel};
use super::types::{CommandPhase, CommandRecord, CycleReport, DispatchSettings, SetupOutcome, SiteReport};
use crate::client::{ChargingProfile, CommandChannel, Inventory, Telemetry};
use crate::devices::Setup;
use crate::error::DispatchError;
use crate::telemetry::Protocol;

/// Protocols detected for each station of a setup, keyed by device id.
pub type DetectedProtocols = HashMap<String, Protocol>;

/// Dispatch engine bound to its collaborators.
///
/// Generic over every collaborator for static dispatch; pass references to
/// share collaborators with other code.
pub struct Dispatcher<I, T, C, K> {
    inventory: I,
    telemetry: T,
    commands: C,
    clock: K,
    settings: DispatchSettings,
}

impl<I, T, C, K> Dispatcher<I, T, C, K>
where
    I: Inventory,
    T: Telemetry,
    C: CommandChannel,
    K: Clock,
{
    /// Creates a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `inventory` - Setup and device registry
    /// * `telemetry` - Device history and measurements
    /// * `commands` - Command channel to field devices
    /// * `clock` - Wall-clock source
    /// * `settings` - Cycle parameters
    pub fn new(inventory: I, telemetry: T, commands: C, clock: K, settings: DispatchSettings) -> Self {
        Self {
            inventory,
            telemetry,
            commands,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Runs one cycle over every setup known to the inventory.
    ///
    /// A setup that fails is put in the safe fallback and the cycle moves
    /// on to the next one.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Inventory` when the setup list itself cannot
    /// be fetched; no command is sent in that case.
    pub fn run_cycle(&self) -> Result<CycleReport, DispatchError> {
        let started_at = self.clock.now();
        let setups = self
            .inventory
            .get_setups()
            .map_err(|source| DispatchError::Inventory {
                what: "setups",
                source,
            })?;
        info!(setups = setups.len(), "dispatch cycle started");

        let mut outcomes = Vec::with_capacity(setups.len());
        for setup in &setups {
            let mut protocols = DetectedProtocols::new();
            let outcome = match self.run_setup(setup, &mut protocols) {
                Ok(report) => SetupOutcome::Dispatched(report),
                Err(e) => {
                    error!(setup_id = setup.id, error = %e, "dispatch failed, applying safe fallback");
                    SetupOutcome::FellBack {
                        setup_id: setup.id,
                        error: e.to_string(),
                        commands: self.safe_fallback(setup, &protocols),
                    }
                }
            };
            info!(setup_id = setup.id, "{outcome}");
            outcomes.push(outcome);
        }

        Ok(CycleReport {
            started_at,
            outcomes,
        })
    }

    /// Runs budget, classification and allocation for one setup.
    pub fn dispatch_setup(&self, setup: &Setup) -> Result<SiteReport, DispatchError> {
        self.run_setup(setup, &mut DetectedProtocols::new())
    }

    /// Like [`Self::dispatch_setup`], filling `protocols` as soon as the
    /// stations are classified so a later failure can still address them.
    fn run_setup(
        &self,
        setup: &Setup,
        protocols: &mut DetectedProtocols,
    ) -> Result<SiteReport, DispatchError> {
        let id = self.settings.timeconfig_id;
        let timeconfig = self
            .inventory
            .get_timeconfig(id)
            .map_err(|source| DispatchError::MissingTimeConfig { id, source })?;
        let (discharge, charge) = timeconfig.windows()?;
        let windows = BatteryWindows { discharge, charge };

        let mut site = SiteModel::load(&self.inventory, setup)?;
        let now = self.clock.now();

        compute_budget(&mut site, &self.telemetry, &self.settings, now);
        classify_stations(&mut site, &self.telemetry, &self.settings, now);
        protocols.extend(
            site.stations
                .iter()
                .filter(|s| s.protocol != Protocol::Unknown)
                .map(|s| (s.station.id.clone(), s.protocol)),
        );
        let budget_kw = site.budget.total_kw;

        let allocation = allocate(&mut site, &self.commands, &self.settings, &windows, now.time())?;

        Ok(SiteReport {
            setup_id: setup.id,
            budget_kw,
            remaining_kw: site.budget.total_kw,
            pv_kw: site.budget.pv_kw,
            ev_kw: site.budget.ev_kw,
            charging: site.count(Availability::Charging),
            available: site.count(Availability::Available),
            unavailable: site.count(Availability::Unavailable),
            branch: allocation.branch,
            commands: allocation.commands,
        })
    }

    /// Puts every station of a setup on its floor and every battery on
    /// keep-alive.
    ///
    /// Device lists are fetched again; a list that cannot be fetched is
    /// skipped, as is any connector whose limit cannot be computed. Stations
    /// missing from `protocols` are addressed with [`Protocol::Unknown`].
    pub fn safe_fallback(&self, setup: &Setup, protocols: &DetectedProtocols) -> Vec<CommandRecord> {
        let mut issuer = CommandIssuer::new(&self.commands, &self.settings, setup.id);

        match self.inventory.get_evcs_by_setup_id(setup.id) {
            Ok(stations) => {
                for station in &stations {
                    let protocol = protocols.get(&station.id).copied().unwrap_or_default();
                    for connector in &station.connectors {
                        let setpoint = match Setpoint::for_connector(station, connector) {
                            Ok(Some(sp)) => sp,
                            Ok(None) => continue,
                            Err(e) => {
                                warn!(setup_id = setup.id, error = %e, "skipping connector in fallback");
                                continue;
                            }
                        };
                        let (unit, limit) = setpoint.limit(floor_kw(connector.pmax_kw));
                        let profile = ChargingProfile {
                            device_id: station.id.clone(),
                            connector_id: station.connector_id(connector),
                            unit,
                            limit,
                            protocol,
                        };
                        issuer.charging(CommandPhase::Fallback, profile);
                    }
                }
            }
            Err(e) => warn!(setup_id = setup.id, error = %e, "fallback could not list stations"),
        }

        match self.inventory.get_bess_by_setup_id(setup.id) {
            Ok(batteries) => {
                for bess in &batteries {
                    issuer.battery(CommandPhase::Fallback, &bess.id, KEEP_ALIVE_KW);
                }
            }
            Err(e) => warn!(setup_id = setup.id, error = %e, "fallback could not list batteries"),
        }

        issuer.into_log()
    }
}
