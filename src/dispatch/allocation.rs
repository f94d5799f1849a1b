//! Allocation of the site budget to stations and batteries.
//!
//! A cycle runs three passes over a classified site:
//!
//! 1. Idle stations get a minimum floor that reserves capacity for a
//!    vehicle about to plug in.
//! 2. Charging stations split what is left in proportion to nameplate.
//! 3. Batteries follow the first matching branch of the time-of-day
//!    policy ([`select_branch`]).
//!
//! Share commands are sent after the battery pass.

use chrono::NaiveTime;
use tracing::{debug, info};

use super::site::{Availability, PowerBudget, SiteModel, StationState};
use super::types::{BatteryBranch, Command, CommandPhase, CommandRecord, DispatchSettings};
use super::window::TimeWindow;
use crate::client::{
    ChargingProfile, CommandChannel, RateUnit, power_command_accepted, set_charging_profile,
};
use crate::devices::{Connector, ControlUnit, Evcs};
use crate::error::DispatchError;
use crate::telemetry::Protocol;

/// Set-point that keeps an idle battery online (kW).
pub const KEEP_ALIVE_KW: f64 = 0.001;

/// Minimum power reserved for an idle connector, tiered by nameplate (kW).
pub fn floor_kw(pmax_kw: f64) -> f64 {
    if pmax_kw < 10.0 {
        1.5
    } else if pmax_kw < 30.0 {
        3.0
    } else if pmax_kw < 50.0 {
        5.0
    } else {
        10.0
    }
}

/// How a connector expresses a power limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Whole amperes at the connector's nominal voltage.
    Current { vnom_v: f64 },
    /// Watts.
    Power,
}

impl Setpoint {
    /// Resolves the set-point form of a connector; `None` for stations that
    /// are not controllable.
    ///
    /// # Errors
    ///
    /// `InvalidDevice` when a current-controlled connector has no positive
    /// nominal voltage.
    pub fn for_connector(station: &Evcs, connector: &Connector) -> Result<Option<Self>, DispatchError> {
        match station.control {
            ControlUnit::Current => {
                let vnom_v = connector.vnom_v.filter(|v| *v > 0.0).ok_or_else(|| {
                    DispatchError::invalid_device(
                        &station.id,
                        format!("connector {} has no positive Vnom", connector.index),
                    )
                })?;
                Ok(Some(Self::Current { vnom_v }))
            }
            ControlUnit::Power => Ok(Some(Self::Power)),
            ControlUnit::None => Ok(None),
        }
    }

    /// Converts a power in kW into the connector's limit.
    pub fn limit(&self, kw: f64) -> (RateUnit, f64) {
        match self {
            Self::Current { vnom_v } => (RateUnit::A, (kw * 1000.0 / vnom_v).trunc()),
            Self::Power => (RateUnit::W, kw * 1000.0),
        }
    }
}

/// A connector ready to receive limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorPlan {
    pub device_id: String,
    pub connector_id: u8,
    pub pmax_kw: f64,
    pub protocol: Protocol,
    pub setpoint: Option<Setpoint>,
}

impl ConnectorPlan {
    /// Plans every connector of a station.
    pub fn for_station(
        station: &Evcs,
        protocol: Protocol,
    ) -> Result<Vec<Self>, DispatchError> {
        station
            .connectors
            .iter()
            .map(|c| {
                Ok(Self {
                    device_id: station.id.clone(),
                    connector_id: station.connector_id(c),
                    pmax_kw: c.pmax_kw,
                    protocol,
                    setpoint: Setpoint::for_connector(station, c)?,
                })
            })
            .collect()
    }

    /// Charging profile for `kw`, or `None` if not controllable.
    pub fn profile(&self, kw: f64) -> Option<ChargingProfile> {
        let (unit, limit) = self.setpoint?.limit(kw);
        Some(ChargingProfile {
            device_id: self.device_id.clone(),
            connector_id: self.connector_id,
            unit,
            limit,
            protocol: self.protocol,
        })
    }
}

fn plan_group<'a>(
    stations: impl Iterator<Item = &'a StationState>,
) -> Result<Vec<ConnectorPlan>, DispatchError> {
    let mut plans = Vec::new();
    for s in stations {
        plans.extend(ConnectorPlan::for_station(&s.station, s.protocol)?);
    }
    Ok(plans)
}

/// Splits `budget_kw` across connectors in proportion to nameplate.
///
/// Each share is capped at its own nameplate and never negative. With a
/// budget no larger than the combined nameplate, the shares sum to the
/// budget.
pub fn proportional_shares(nameplates_kw: &[f64], budget_kw: f64) -> Vec<f64> {
    let total: f64 = nameplates_kw.iter().sum();
    if total <= 0.0 {
        return vec![0.0; nameplates_kw.len()];
    }
    nameplates_kw
        .iter()
        .map(|p| (p * budget_kw / total).min(*p).max(0.0))
        .collect()
}

/// Time-of-day windows of the battery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryWindows {
    pub discharge: TimeWindow,
    pub charge: TimeWindow,
}

/// Picks the battery branch: the first condition that holds wins.
pub fn select_branch(time: NaiveTime, windows: &BatteryWindows, budget: &PowerBudget) -> BatteryBranch {
    if windows.discharge.contains(time) {
        BatteryBranch::DischargeWindow
    } else if budget.ev_kw > budget.nominal_kw + budget.pv_kw {
        BatteryBranch::CoverExcess
    } else if budget.pv_kw > budget.ev_kw {
        BatteryBranch::StoreSurplus
    } else if windows.charge.contains(time) {
        BatteryBranch::ChargeWindow
    } else {
        BatteryBranch::Idle
    }
}

/// Sends commands for one setup and keeps the command log.
pub(crate) struct CommandIssuer<'a, C: ?Sized> {
    channel: &'a C,
    settings: &'a DispatchSettings,
    setup_id: u32,
    log: Vec<CommandRecord>,
}

impl<'a, C: CommandChannel + ?Sized> CommandIssuer<'a, C> {
    pub(crate) fn new(channel: &'a C, settings: &'a DispatchSettings, setup_id: u32) -> Self {
        Self {
            channel,
            settings,
            setup_id,
            log: Vec::new(),
        }
    }

    /// Sends a charging profile with retries; `true` when accepted.
    pub(crate) fn charging(&mut self, phase: CommandPhase, profile: ChargingProfile) -> bool {
        let accepted =
            set_charging_profile(self.channel, &profile, self.settings.command_retries).is_some();
        self.record(phase, Command::Charging(profile), accepted)
    }

    /// Sends a battery set-point once; `true` when accepted.
    pub(crate) fn battery(&mut self, phase: CommandPhase, device_id: &str, power_kw: f64) -> bool {
        let accepted = power_command_accepted(self.channel, device_id, power_kw);
        let command = Command::Battery {
            device_id: device_id.to_string(),
            power_kw,
        };
        self.record(phase, command, accepted)
    }

    fn record(&mut self, phase: CommandPhase, command: Command, accepted: bool) -> bool {
        let record = CommandRecord {
            setup_id: self.setup_id,
            phase,
            command,
            accepted,
        };
        if self.settings.notification {
            info!(setup_id = self.setup_id, "{record}");
        } else {
            debug!(setup_id = self.setup_id, "{record}");
        }
        self.log.push(record);
        accepted
    }

    pub(crate) fn into_log(self) -> Vec<CommandRecord> {
        self.log
    }
}

/// Commands issued for a setup and the battery branch taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub branch: BatteryBranch,
    pub commands: Vec<CommandRecord>,
}

/// Runs the floor, proportional and battery passes over a classified site
/// and sends the resulting commands.
///
/// Every connector is resolved before the first command goes out, so an
/// invalid station fails the setup without touching any device. Denied
/// commands never abort the pass; the budget is adjusted instead.
///
/// # Arguments
///
/// * `site` - Site after budgeting and classification; its budget is updated
/// * `channel` - Command channel
/// * `settings` - Retry count and log verbosity
/// * `windows` - Discharge and charge windows
/// * `time` - Local time of day for the window checks
pub fn allocate<C: CommandChannel + ?Sized>(
    site: &mut SiteModel,
    channel: &C,
    settings: &DispatchSettings,
    windows: &BatteryWindows,
    time: NaiveTime,
) -> Result<Allocation, DispatchError> {
    let idle = plan_group(site.with_availability(Availability::Available))?;
    let charging = plan_group(site.with_availability(Availability::Charging))?;

    let mut issuer = CommandIssuer::new(channel, settings, site.setup.id);

    // 1. floors
    for plan in &idle {
        let floor = floor_kw(plan.pmax_kw);
        let Some(profile) = plan.profile(floor) else {
            continue;
        };
        if issuer.charging(CommandPhase::Floor, profile) {
            site.budget.total_kw -= floor;
        } else {
            site.budget.total_kw -= plan.pmax_kw;
        }
    }

    // 2. proportional shares
    let nameplates: Vec<f64> = charging.iter().map(|p| p.pmax_kw).collect();
    let shares = proportional_shares(&nameplates, site.budget.total_kw);
    // Includes shares of uncontrollable stations, which get no command.
    site.budget.ev_kw += shares.iter().sum::<f64>();
    debug!(
        setup_id = site.setup.id,
        budget_kw = site.budget.total_kw,
        ev_kw = site.budget.ev_kw,
        "shares computed"
    );

    // 3. batteries
    let branch = select_branch(time, windows, &site.budget);
    dispatch_batteries(branch, site, &mut issuer);

    // 4. share commands
    for (plan, kw) in charging.iter().zip(shares) {
        if let Some(profile) = plan.profile(kw) {
            issuer.charging(CommandPhase::Share, profile);
        }
    }

    Ok(Allocation {
        branch,
        commands: issuer.into_log(),
    })
}

fn dispatch_batteries<C: CommandChannel + ?Sized>(
    branch: BatteryBranch,
    site: &mut SiteModel,
    issuer: &mut CommandIssuer<'_, C>,
) {
    let groups = &site.batteries;
    let budget = &mut site.budget;
    let phase = CommandPhase::Battery;

    match branch {
        BatteryBranch::DischargeWindow => {
            let mut uncovered = budget.ev_kw;
            for bess in &groups.to_discharge {
                if uncovered <= 0.0 {
                    break;
                }
                let p = uncovered.min(bess.pmax_kw);
                if issuer.battery(phase, &bess.id, -p) {
                    uncovered -= p;
                }
            }
        }
        BatteryBranch::CoverExcess => {
            let mut excess = budget.ev_kw - budget.nominal_kw - budget.pv_kw;
            for bess in &groups.to_discharge {
                let p = excess.min(bess.pmax_kw);
                if issuer.battery(phase, &bess.id, -p) {
                    excess -= p;
                }
                if excess <= 0.0 {
                    break;
                }
            }
        }
        BatteryBranch::StoreSurplus => {
            let mut surplus = budget.pv_kw - budget.ev_kw;
            for bess in groups.to_charge.iter().chain(&groups.to_discharge) {
                let p = surplus.min(bess.pmax_kw);
                if issuer.battery(phase, &bess.id, p) {
                    surplus -= p;
                }
                if surplus <= 0.0 {
                    break;
                }
            }
        }
        BatteryBranch::ChargeWindow => {
            let mut headroom = budget.nominal_kw + budget.pv_kw - budget.ev_kw;
            for bess in &groups.half_charged {
                if budget.ev_kw > budget.nominal_kw + budget.pv_kw - bess.pmax_kw {
                    continue;
                }
                let p = headroom.min(bess.pmax_kw);
                if p <= 0.0 {
                    continue;
                }
                if issuer.battery(phase, &bess.id, p) {
                    headroom -= p;
                    // Both the nameplate and the charge power are reserved.
                    budget.total_kw -= bess.pmax_kw;
                    budget.total_kw -= p;
                }
            }
        }
        BatteryBranch::Idle => {
            for bess in &site.bess {
                if issuer.battery(phase, &bess.id, KEEP_ALIVE_KW) {
                    budget.total_kw -= bess.pmax_kw;
                }
            }
        }
    }
}
