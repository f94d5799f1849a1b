use std::env;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    /// Run a single cycle and exit.
    pub once: bool,
    /// Dispatch against the simulated microgrid instead of the services.
    pub simulate: bool,
    pub seed: u64,
    pub commands_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut opts = CliOptions {
        seed: 42,
        ..CliOptions::default()
    };
    let mut seed_given = false;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if opts.config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if opts.preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--commands-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --commands-out (expected a file path)")?;
                if opts.commands_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--commands-out provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected an integer)")?;
                opts.seed = raw
                    .parse()
                    .map_err(|_| format!("invalid value for --seed: \"{raw}\""))?;
                seed_given = true;
            }
            "--once" => opts.once = true,
            "--simulate" => opts.simulate = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if opts.config.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    if seed_given && !opts.simulate {
        return Err("--seed only applies together with --simulate".to_string());
    }

    Ok(opts)
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  der-dispatch [--config <path> | --preset <name>] [--once] [--simulate [--seed <n>]] [--commands-out <path>]"
    );
    eprintln!();
    eprintln!("Environment: INTERVAL, SECURITY_MODE, NOTIFICATION, DERS_AUTH_USER, DERS_AUTH_PASSWORD, RUST_LOG");
}
