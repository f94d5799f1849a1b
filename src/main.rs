//! DER dispatch entry point: configuration, collaborator wiring, and the
//! cycle loop.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, bail};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use der_dispatch::cli::{self, CliOptions};
use der_dispatch::client::http::{SharedTokenSource, build_client};
use der_dispatch::client::{
    CommandChannel, HttpCommandChannel, HttpInventory, HttpTelemetry, Inventory, NoAuth,
    PasswordGrant, Telemetry,
};
use der_dispatch::config::{AuthMode, Config};
use der_dispatch::dispatch::{Clock, CycleReport, DispatchSettings, Dispatcher, SystemClock};
use der_dispatch::io::export::export_csv;
use der_dispatch::sim::SimulatedMicrogrid;

fn load_config(cli: &CliOptions) -> anyhow::Result<Config> {
    let mut config = match (&cli.config, &cli.preset) {
        (Some(path), _) => Config::from_toml_file(path)?,
        (None, Some(name)) => Config::from_preset(name)?,
        (None, None) => Config::local(),
    };
    config.apply_env()?;

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("{} invalid configuration field(s)", errors.len());
    }
    Ok(config)
}

/// Runs cycles until the process is stopped, or a single one with `--once`.
fn run<I, T, C, K>(
    dispatcher: &Dispatcher<I, T, C, K>,
    config: &Config,
    cli: &CliOptions,
) -> anyhow::Result<()>
where
    I: Inventory,
    T: Telemetry,
    C: CommandChannel,
    K: Clock,
{
    loop {
        match dispatcher.run_cycle() {
            Ok(report) => {
                println!("{report}");
                if let Some(path) = &cli.commands_out {
                    write_commands(&report, path)?;
                }
            }
            Err(e) if cli.once => return Err(e).context("dispatch cycle failed"),
            Err(e) => error!(error = %e, "dispatch cycle failed"),
        }
        if cli.once {
            return Ok(());
        }
        thread::sleep(config.cycle_period());
    }
}

fn write_commands(report: &CycleReport, path: &Path) -> anyhow::Result<()> {
    export_csv(report, path)
        .with_context(|| format!("failed to write command log to {}", path.display()))?;
    info!(path = %path.display(), "command log written");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::parse_args().map_err(anyhow::Error::msg)?;
    let config = load_config(&cli)?;
    let settings = DispatchSettings::from(&config);

    if cli.simulate {
        info!(seed = cli.seed, "dispatching against the simulated microgrid");
        let grid = SimulatedMicrogrid::demo(cli.seed, SystemClock);
        let dispatcher = Dispatcher::new(&grid, &grid, &grid, SystemClock, settings);
        return run(&dispatcher, &config, &cli);
    }

    let client = build_client(config.request_timeout()).context("failed to build HTTP client")?;
    let auth: SharedTokenSource = match config.auth.mode {
        AuthMode::None => Arc::new(NoAuth),
        AuthMode::Password => Arc::new(PasswordGrant::new(
            client.clone(),
            config.auth.token_url.clone(),
            config.auth.client_id.clone(),
            config.auth.username.clone(),
            config.auth.password.clone(),
        )),
    };

    let services = &config.services;
    info!(inventory = %services.inventory_url, "dispatching against remote services");
    let dispatcher = Dispatcher::new(
        HttpInventory::new(client.clone(), services.inventory_url.clone()),
        HttpTelemetry::new(client.clone(), services, Arc::clone(&auth)),
        HttpCommandChannel::new(client, services, auth),
        SystemClock,
        settings,
    );
    run(&dispatcher, &config, &cli)
}
