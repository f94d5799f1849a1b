//! Power dispatch engine: site model, availability, budget, allocation, and
//! the per-cycle orchestrator.

pub mod allocation;
pub mod availability;
pub mod budget;
pub mod clock;
pub mod orchestrator;
pub mod site;
pub mod types;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use orchestrator::{DetectedProtocols, Dispatcher};
pub use site::{Availability, PowerBudget, SiteModel};
pub use types::{
    BatteryBranch, Command, CommandPhase, CommandRecord, CycleReport, DispatchSettings,
    SetupOutcome, SiteReport,
};
pub use window::TimeWindow;
