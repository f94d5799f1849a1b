//! Settings, command records and cycle reports of the dispatch engine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::client::ChargingProfile;

/// Parameters of a dispatch cycle, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Dispatch interval (minutes); sizes the battery reserve check.
    pub interval_minutes: f64,
    /// Drop unresponsive stations' nameplate from the budget.
    pub safety_mode: bool,
    /// Log every command at info level instead of debug.
    pub notification: bool,
    /// Pause after each station availability check.
    pub throttle: Duration,
    pub timeconfig_id: u32,
    pub status_minutes: u32,
    pub heartbeat_minutes: u32,
    pub bess_minutes: u32,
    pub pv_minutes: u32,
    /// Extra attempts for a charging profile that is not accepted.
    pub command_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 5.0,
            safety_mode: true,
            notification: true,
            throttle: Duration::from_secs(1),
            timeconfig_id: 1,
            status_minutes: 240,
            heartbeat_minutes: 30,
            bess_minutes: 5,
            pv_minutes: 10,
            command_retries: 3,
        }
    }
}

/// Stage of the cycle that issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// Minimum power for an idle station.
    Floor,
    /// Proportional share for a charging station.
    Share,
    /// Battery set-point.
    Battery,
    /// Safe fallback after a failed cycle.
    Fallback,
}

impl fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Floor => "floor",
            Self::Share => "share",
            Self::Battery => "battery",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// A command sent to a field device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Charging(ChargingProfile),
    /// Battery active power (kW); negative discharges.
    Battery { device_id: String, power_kw: f64 },
}

impl Command {
    pub fn device_id(&self) -> &str {
        match self {
            Self::Charging(p) => &p.device_id,
            Self::Battery { device_id, .. } => device_id,
        }
    }
}

/// One issued command and whether the device accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub setup_id: u32,
    pub phase: CommandPhase,
    pub command: Command,
    pub accepted: bool,
}

impl fmt::Display for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.accepted { "accepted" } else { "denied" };
        match &self.command {
            Command::Charging(p) => write!(
                f,
                "[{}] {} connector {} -> {:.3} {} ({}) {}",
                self.phase, p.device_id, p.connector_id, p.limit, p.unit, p.protocol, outcome
            ),
            Command::Battery {
                device_id,
                power_kw,
            } => write!(
                f,
                "[{}] {} -> {:.3} kW {}",
                self.phase, device_id, power_kw, outcome
            ),
        }
    }
}

/// Battery policy branch selected for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryBranch {
    /// Inside the discharge window: batteries feed the EV load.
    DischargeWindow,
    /// EV load exceeds site limit plus PV: batteries cover the excess.
    CoverExcess,
    /// PV exceeds EV load: batteries absorb the surplus.
    StoreSurplus,
    /// Inside the charge window: half-charged batteries top up.
    ChargeWindow,
    /// No condition met: batteries hold near zero.
    Idle,
}

impl fmt::Display for BatteryBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DischargeWindow => "discharge-window",
            Self::CoverExcess => "cover-excess",
            Self::StoreSurplus => "store-surplus",
            Self::ChargeWindow => "charge-window",
            Self::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// Result of a completed dispatch for one setup.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteReport {
    pub setup_id: u32,
    /// Dispatchable power after budgeting and availability checks (kW).
    pub budget_kw: f64,
    /// Budget left after floors and battery reservations (kW).
    pub remaining_kw: f64,
    pub pv_kw: f64,
    /// Total allocated to charging stations (kW).
    pub ev_kw: f64,
    pub charging: usize,
    pub available: usize,
    pub unavailable: usize,
    pub branch: BatteryBranch,
    pub commands: Vec<CommandRecord>,
}

/// What happened to one setup during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupOutcome {
    Dispatched(SiteReport),
    FellBack {
        setup_id: u32,
        error: String,
        commands: Vec<CommandRecord>,
    },
}

impl SetupOutcome {
    pub fn setup_id(&self) -> u32 {
        match self {
            Self::Dispatched(r) => r.setup_id,
            Self::FellBack { setup_id, .. } => *setup_id,
        }
    }

    pub fn commands(&self) -> &[CommandRecord] {
        match self {
            Self::Dispatched(r) => &r.commands,
            Self::FellBack { commands, .. } => commands,
        }
    }

    pub fn fell_back(&self) -> bool {
        matches!(self, Self::FellBack { .. })
    }
}

/// Outcome of one cycle over every setup.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<FixedOffset>,
    pub outcomes: Vec<SetupOutcome>,
}

impl CycleReport {
    /// Every command of the cycle, in issue order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandRecord> {
        self.outcomes.iter().flat_map(|o| o.commands().iter())
    }

    pub fn outcome(&self, setup_id: u32) -> Option<&SetupOutcome> {
        self.outcomes.iter().find(|o| o.setup_id() == setup_id)
    }
}

impl fmt::Display for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatched(r) => write!(
                f,
                "setup {:>3} | budget={:>7.2} kW  ev={:>7.2} kW  pv={:>6.2} kW  left={:>7.2} kW \
                 | stations {}c/{}a/{}u | battery {} | {} commands",
                r.setup_id,
                r.budget_kw,
                r.ev_kw,
                r.pv_kw,
                r.remaining_kw,
                r.charging,
                r.available,
                r.unavailable,
                r.branch,
                r.commands.len(),
            ),
            Self::FellBack {
                setup_id,
                error,
                commands,
            } => write!(
                f,
                "setup {:>3} | FALLBACK ({}) | {} commands",
                setup_id,
                error,
                commands.len()
            ),
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycle at {}", self.started_at.format("%Y-%m-%d %H:%M:%S %:z"))?;
        for outcome in &self.outcomes {
            writeln!(f, "  {outcome}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RateUnit;
    use crate::telemetry::Protocol;

    fn record(accepted: bool) -> CommandRecord {
        CommandRecord {
            setup_id: 1,
            phase: CommandPhase::Share,
            command: Command::Charging(ChargingProfile {
                device_id: "cp1".into(),
                connector_id: 0,
                unit: RateUnit::A,
                limit: 100.0,
                protocol: Protocol::Ocpp16,
            }),
            accepted,
        }
    }

    #[test]
    fn command_record_display() {
        assert_eq!(
            record(true).to_string(),
            "[share] cp1 connector 0 -> 100.000 A (OCPP 1.6) accepted"
        );
        let bat = CommandRecord {
            setup_id: 1,
            phase: CommandPhase::Battery,
            command: Command::Battery {
                device_id: "b1".into(),
                power_kw: -5.0,
            },
            accepted: false,
        };
        assert_eq!(bat.to_string(), "[battery] b1 -> -5.000 kW denied");
    }

    #[test]
    fn cycle_report_collects_commands_across_setups() {
        let report = CycleReport {
            started_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap(),
            outcomes: vec![
                SetupOutcome::FellBack {
                    setup_id: 1,
                    error: "boom".into(),
                    commands: vec![record(true)],
                },
                SetupOutcome::FellBack {
                    setup_id: 2,
                    error: "boom".into(),
                    commands: vec![record(false), record(true)],
                },
            ],
        };
        assert_eq!(report.commands().count(), 3);
        assert!(report.outcome(2).is_some_and(SetupOutcome::fell_back));
        assert!(report.to_string().contains("FALLBACK (boom)"));
    }
}
