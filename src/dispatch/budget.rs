//! Dispatchable power contributed by batteries, PV and V2G units.

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::site::SiteModel;
use super::types::DispatchSettings;
use crate::client::Telemetry;
use crate::telemetry::{fresh_bess_measurement, fresh_pv_measurement};

/// State of charge at or below which a battery is half-charged.
pub const HALF_CHARGED_SOC: f64 = 0.5;

/// Adds storage, generation and V2G capacity to the site budget and groups
/// batteries by state of charge.
///
/// Only batteries and inverters with a fresh reading contribute. A battery
/// that can sustain full power for one interval is to-discharge and adds
/// its nameplate; otherwise it is to-charge. V2G units add their full
/// connector nameplate without any telemetry.
pub fn compute_budget<T: Telemetry + ?Sized>(
    site: &mut SiteModel,
    telemetry: &T,
    settings: &DispatchSettings,
    now: DateTime<FixedOffset>,
) {
    let setup_id = site.setup.id;

    for bess in &site.bess {
        let Some(m) = fresh_bess_measurement(telemetry, bess, settings.bess_minutes, now) else {
            debug!(setup_id, device_id = %bess.id, "no fresh battery reading");
            continue;
        };

        let soc = m.soc();
        let demand_kwh = bess.interval_demand_kwh(settings.interval_minutes);
        if soc <= HALF_CHARGED_SOC {
            site.batteries.half_charged.push(bess.clone());
        }
        if soc * bess.emax_kwh > demand_kwh {
            site.budget.total_kw += bess.pmax_kw;
            site.batteries.to_discharge.push(bess.clone());
        } else {
            site.batteries.to_charge.push(bess.clone());
        }
        debug!(setup_id, device_id = %bess.id, soc, demand_kwh, "battery classified");
    }

    for pv in &site.pv {
        if let Some(m) = fresh_pv_measurement(telemetry, pv, settings.pv_minutes, now) {
            let kw = m.generation_kw();
            site.budget.total_kw += kw;
            site.budget.pv_kw += kw;
            debug!(setup_id, device_id = %pv.id, kw, "pv generation");
        }
    }

    // V2G has no live telemetry yet.
    for v2g in &site.v2g {
        site.budget.total_kw += v2g.nameplate_kw();
    }

    debug!(
        setup_id,
        total_kw = site.budget.total_kw,
        pv_kw = site.budget.pv_kw,
        "budget computed"
    );
}
