//! End-to-end dispatch cycles against in-memory collaborators.

mod common;

use common::{Fleet, History, Recorder, at, clock, settings};
use der_dispatch::client::RateUnit;
use der_dispatch::devices::{Bess, ChargePoint, Connector, ControlUnit, Pv, Setup};
use der_dispatch::dispatch::{
    BatteryBranch, Command, CommandPhase, DispatchSettings, Dispatcher, SetupOutcome,
    SiteReport,
};
use der_dispatch::error::DispatchError;
use der_dispatch::telemetry::Protocol;

fn dispatched(outcome: Option<&SetupOutcome>) -> &SiteReport {
    match outcome {
        Some(SetupOutcome::Dispatched(report)) => report,
        other => panic!("expected a dispatched setup, got {other:?}"),
    }
}

fn single_station_fleet(setup_kw: f64, control: ControlUnit) -> Fleet {
    let mut fleet = Fleet::new();
    fleet.setups.push(Setup::new(1, setup_kw));
    fleet
        .evcs
        .push(ChargePoint::new("cp1", 1, control, vec![Connector::new(1, 22.0, 220.0)]));
    fleet
}

#[test]
fn charging_station_gets_whole_budget_in_amperes() {
    let fleet = single_station_fleet(22.0, ControlUnit::Current);
    let history = History::new(at("12:00")).status("cp1", "Charging");
    let recorder = Recorder::default();

    let dispatcher = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings());
    let report = dispatcher.run_cycle().unwrap();

    let site = dispatched(report.outcome(1));
    assert_eq!(site.charging, 1);
    assert_eq!(site.branch, BatteryBranch::Idle);
    assert!((site.ev_kw - 22.0).abs() < 1e-9);

    let profiles = recorder.profiles.borrow();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].connector_id, 0);
    assert_eq!(profiles[0].unit, RateUnit::A);
    assert_eq!(profiles[0].limit, 100.0);
    assert_eq!(profiles[0].protocol, Protocol::Ocpp16);
}

#[test]
fn idle_station_receives_its_floor() {
    let mut fleet = single_station_fleet(50.0, ControlUnit::Power);
    fleet.evcs.push(ChargePoint::new(
        "cp2",
        1,
        ControlUnit::Power,
        vec![Connector::new(1, 7.4, 220.0), Connector::new(2, 7.4, 220.0)],
    ));
    let history = History::new(at("12:00"))
        .status("cp1", "Charging")
        .status("cp2", "Available");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));

    let floors: Vec<_> = site
        .commands
        .iter()
        .filter(|c| c.phase == CommandPhase::Floor)
        .collect();
    assert_eq!(floors.len(), 2);
    for record in floors {
        let Command::Charging(p) = &record.command else {
            panic!("floor must be a charging profile");
        };
        assert_eq!(p.device_id, "cp2");
        assert_eq!(p.unit, RateUnit::W);
        assert_eq!(p.limit, 1500.0);
    }
    // two 1.5 kW floors leave 47 kW, capped at cp1's 22 kW nameplate
    assert!((site.ev_kw - 22.0).abs() < 1e-9);
    assert!((site.remaining_kw - 47.0).abs() < 1e-9);
}

#[test]
fn safety_mode_reserves_silent_station_nameplate() {
    let mut fleet = single_station_fleet(30.0, ControlUnit::Power);
    fleet.evcs.push(ChargePoint::new(
        "silent",
        1,
        ControlUnit::Power,
        vec![Connector::new(1, 22.0, 220.0)],
    ));
    let history = History::new(at("12:00")).status("cp1", "Charging");

    let recorder = Recorder::default();
    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert_eq!(site.unavailable, 1);
    assert!((site.budget_kw - 8.0).abs() < 1e-9);
    assert_eq!(recorder.profiles.borrow()[0].limit, 8000.0);
    assert!(recorder.profiles.borrow().iter().all(|p| p.device_id == "cp1"));

    let relaxed = DispatchSettings {
        safety_mode: false,
        ..settings()
    };
    let recorder = Recorder::default();
    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), relaxed)
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert!((site.budget_kw - 30.0).abs() < 1e-9);
    assert_eq!(recorder.profiles.borrow()[0].limit, 22000.0);
}

#[test]
fn heartbeat_keeps_station_available() {
    let fleet = single_station_fleet(22.0, ControlUnit::Power);
    let history = History::new(at("12:00")).heartbeat("cp1");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert_eq!(site.available, 1);
    let profiles = recorder.profiles.borrow();
    assert_eq!(profiles[0].limit, 3000.0);
    assert_eq!(profiles[0].protocol, Protocol::Ocpp201);
}

fn storage_fleet() -> Fleet {
    let mut fleet = single_station_fleet(10.0, ControlUnit::Power);
    fleet.bess.push(Bess::new("b1", 1, 10.0, 40.0));
    fleet.pv.push(Pv::new("pv1", 1, 40.0));
    fleet
}

fn storage_history(hh_mm: &str) -> History {
    History::new(at(hh_mm))
        .status("cp1", "Charging")
        .soc("b1", 80.0)
        .pv_watts("pv1", 30_000.0)
}

#[test]
fn discharge_window_overrides_pv_surplus() {
    let fleet = storage_fleet();
    let history = storage_history("19:00");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("19:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert_eq!(site.branch, BatteryBranch::DischargeWindow);
    assert_eq!(*recorder.battery.borrow(), vec![("b1".to_string(), -10.0)]);
}

#[test]
fn pv_surplus_charges_batteries_outside_windows() {
    let fleet = storage_fleet();
    let history = storage_history("12:00");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert_eq!(site.branch, BatteryBranch::StoreSurplus);
    // 10 kW site + 10 kW battery + 30 kW PV; the station takes its 22 kW
    assert!((site.pv_kw - 30.0).abs() < 1e-9);
    let battery = recorder.battery.borrow();
    assert_eq!(battery.len(), 1);
    assert!((battery[0].1 - 8.0).abs() < 1e-9);
}

#[test]
fn invalid_station_falls_back_without_touching_other_setups() {
    let mut fleet = Fleet::new();
    fleet.setups.push(Setup::new(1, 30.0));
    fleet.setups.push(Setup::new(2, 22.0));
    let no_vnom = Connector {
        vnom_v: None,
        ..Connector::new(1, 22.0, 220.0)
    };
    fleet
        .evcs
        .push(ChargePoint::new("broken", 1, ControlUnit::Current, vec![no_vnom]));
    fleet.evcs.push(ChargePoint::new(
        "good",
        1,
        ControlUnit::Power,
        vec![Connector::new(1, 7.0, 220.0)],
    ));
    fleet.bess.push(Bess::new("b1", 1, 5.0, 10.0));
    fleet.evcs.push(ChargePoint::new(
        "other",
        2,
        ControlUnit::Current,
        vec![Connector::new(1, 22.0, 220.0)],
    ));
    let history = History::new(at("12:00"))
        .status("broken", "Charging")
        .status("good", "Charging")
        .status("other", "Charging");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();

    let failed = report.outcome(1).unwrap();
    assert!(failed.fell_back());
    assert!(failed.commands().iter().all(|c| c.phase == CommandPhase::Fallback));
    let devices: Vec<_> = failed.commands().iter().map(|c| c.command.device_id()).collect();
    assert_eq!(devices, vec!["good", "b1"]);
    let Command::Charging(floor) = &failed.commands()[0].command else {
        panic!("fallback starts with station floors");
    };
    assert_eq!(floor.limit, 1500.0);
    assert_eq!(floor.protocol, Protocol::Ocpp16);
    assert_eq!(
        failed.commands()[1].command,
        Command::Battery {
            device_id: "b1".to_string(),
            power_kw: 0.001
        }
    );

    let other = dispatched(report.outcome(2));
    assert_eq!(other.commands.len(), 1);
    assert_eq!(other.commands[0].phase, CommandPhase::Share);
}

#[test]
fn fallback_keeps_protocol_detected_before_the_failure() {
    let mut fleet = Fleet::new();
    fleet.setups.push(Setup::new(1, 30.0));
    let no_vnom = Connector {
        vnom_v: None,
        ..Connector::new(1, 22.0, 220.0)
    };
    fleet
        .evcs
        .push(ChargePoint::new("broken", 1, ControlUnit::Current, vec![no_vnom]));
    for id in ["v201", "silent"] {
        fleet.evcs.push(ChargePoint::new(
            id,
            1,
            ControlUnit::Power,
            vec![Connector::new(1, 7.0, 220.0)],
        ));
    }
    let history = History::new(at("12:00"))
        .status("broken", "Charging")
        .heartbeat("v201");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    assert!(report.outcome(1).unwrap().fell_back());

    let profiles = recorder.profiles.borrow();
    let protocols: Vec<_> = profiles
        .iter()
        .map(|p| (p.device_id.as_str(), p.protocol))
        .collect();
    assert_eq!(
        protocols,
        vec![("v201", Protocol::Ocpp201), ("silent", Protocol::Unknown)]
    );
}

#[test]
fn missing_timeconfig_falls_back_every_setup() {
    let mut fleet = single_station_fleet(22.0, ControlUnit::Power);
    fleet.timeconfig = None;
    let history = History::new(at("12:00")).status("cp1", "Charging");
    let recorder = Recorder::default();

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let outcome = report.outcome(1).unwrap();
    let SetupOutcome::FellBack { error, commands, .. } = outcome else {
        panic!("expected a fallback, got {outcome:?}");
    };
    assert!(error.contains("time configuration"));
    assert_eq!(commands.len(), 1);
    assert_eq!(recorder.profiles.borrow()[0].limit, 3000.0);
}

#[test]
fn setup_listing_failure_aborts_cycle() {
    let mut fleet = single_station_fleet(22.0, ControlUnit::Power);
    fleet.fail_setups = true;
    let history = History::new(at("12:00"));
    let recorder = Recorder::default();

    let result = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings()).run_cycle();
    assert!(matches!(result, Err(DispatchError::Inventory { what: "setups", .. })));
    assert_eq!(recorder.calls.get(), 0);
}

#[test]
fn rejected_profile_is_retried_then_logged_as_denied() {
    let fleet = single_station_fleet(22.0, ControlUnit::Power);
    let history = History::new(at("12:00")).status("cp1", "Charging");
    let recorder = Recorder::rejecting(&["cp1"]);

    let report = Dispatcher::new(&fleet, &history, &recorder, clock("12:00"), settings())
        .run_cycle()
        .unwrap();
    let site = dispatched(report.outcome(1));
    assert_eq!(site.commands.len(), 1);
    assert!(!site.commands[0].accepted);
    assert_eq!(recorder.calls.get(), 1 + settings().command_retries as usize);
}
