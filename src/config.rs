//! TOML-based service configuration, presets, and environment overrides.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::DispatchSettings;

/// Top-level configuration parsed from TOML.
///
/// Every section has defaults matching the `local` preset. Load from TOML
/// with [`Config::from_toml_file`], then layer the process environment on
/// top with [`Config::apply_env`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Cycle timing and dispatch behaviour.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Maximum telemetry ages.
    #[serde(default)]
    pub freshness: FreshnessConfig,
    /// Collaborator endpoints.
    #[serde(default)]
    pub services: ServicesConfig,
    /// Credentials for the telemetry and command services.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Cycle timing and dispatch behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Dispatch interval (minutes) used in the battery demand formula.
    pub interval_minutes: f64,
    /// Seconds between two cycles of the service loop.
    pub cycle_period_secs: u64,
    /// Reserve nameplate power of stations that stopped reporting.
    pub safety_mode: bool,
    /// Log every issued command at `info` instead of `debug`.
    pub notification: bool,
    /// Pause after each station availability check (ms).
    pub throttle_ms: u64,
    /// Id of the TimeConfig record read every cycle.
    pub timeconfig_id: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5.0,
            cycle_period_secs: 60,
            safety_mode: true,
            notification: true,
            throttle_ms: 1000,
            timeconfig_id: 1,
        }
    }
}

/// Maximum telemetry ages (minutes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessConfig {
    pub status_minutes: u32,
    pub heartbeat_minutes: u32,
    pub bess_minutes: u32,
    pub pv_minutes: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            status_minutes: 240,
            heartbeat_minutes: 30,
            bess_minutes: 5,
            pv_minutes: 10,
        }
    }
}

/// Collaborator endpoints and transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesConfig {
    /// Base URL of the inventory service (setups, devices, timeconfig).
    pub inventory_url: String,
    pub device_history_url: String,
    pub bess_measurements_url: String,
    pub pv_measurements_url: String,
    pub bess_command_url: String,
    pub charging_profile_url: String,
    /// Per-request timeout (seconds).
    pub request_timeout_secs: u64,
    /// Extra attempts for a charging profile after the first one.
    pub command_retries: u32,
}

impl ServicesConfig {
    fn with_hosts(inventory_host: &str, manager_host: &str) -> Self {
        let manager = |process: &str| format!("http://{manager_host}/manager/{process}");
        Self {
            inventory_url: format!("http://{inventory_host}/ders/secondlayer/"),
            device_history_url: manager("deviceHistory"),
            bess_measurements_url: manager("getMeasurementsBess"),
            pv_measurements_url: manager("getResourceFvMeasurement"),
            bess_command_url: manager("bessCommandSet"),
            charging_profile_url: manager("setChargingProfile"),
            request_timeout_secs: 10,
            command_retries: 3,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self::with_hosts("localhost:40080", "localhost:48080")
    }
}

/// How the telemetry and command services are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No `authorization` field is sent.
    #[default]
    None,
    /// OAuth2 password grant against `token_url`.
    Password,
}

/// Credentials for the telemetry and command services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token_url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::None,
            token_url: String::new(),
            client_id: "gders-api".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"engine.interval_minutes"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn error(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        field: field.to_string(),
        message: message.into(),
    }
}

fn parse_flag(value: &str) -> bool {
    !value.trim().eq_ignore_ascii_case("false")
}

impl Config {
    /// Services reached on the developer host.
    pub fn local() -> Self {
        Self::default()
    }

    /// Services reached through the compose network.
    pub fn docker() -> Self {
        Self {
            services: ServicesConfig::with_hosts("nginx:80", "manager:48080"),
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["local", "docker"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "local" => Ok(Self::local()),
            "docker" => Ok(Self::docker()),
            _ => Err(error(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            error("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| error("toml", e.to_string()))
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `INTERVAL` is not a number.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Recognized keys: `INTERVAL` (minutes), `SECURITY_MODE` and
    /// `NOTIFICATION` (anything but `FALSE` enables), `DERS_AUTH_USER`,
    /// `DERS_AUTH_PASSWORD`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INTERVAL") {
            self.engine.interval_minutes = v
                .trim()
                .parse()
                .map_err(|_| error("INTERVAL", format!("not a number: \"{v}\"")))?;
        }
        if let Some(v) = lookup("SECURITY_MODE") {
            self.engine.safety_mode = parse_flag(&v);
        }
        if let Some(v) = lookup("NOTIFICATION") {
            self.engine.notification = parse_flag(&v);
        }
        if let Some(v) = lookup("DERS_AUTH_USER") {
            self.auth.username = v;
        }
        if let Some(v) = lookup("DERS_AUTH_PASSWORD") {
            self.auth.password = v;
        }
        Ok(())
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let e = &self.engine;
        if e.interval_minutes.is_nan() || e.interval_minutes <= 0.0 {
            errors.push(error("engine.interval_minutes", "must be > 0"));
        }
        if e.cycle_period_secs == 0 {
            errors.push(error("engine.cycle_period_secs", "must be > 0"));
        }

        let f = &self.freshness;
        for (field, minutes) in [
            ("freshness.status_minutes", f.status_minutes),
            ("freshness.heartbeat_minutes", f.heartbeat_minutes),
            ("freshness.bess_minutes", f.bess_minutes),
            ("freshness.pv_minutes", f.pv_minutes),
        ] {
            if minutes == 0 {
                errors.push(error(field, "must be > 0"));
            }
        }

        let s = &self.services;
        for (field, url) in [
            ("services.inventory_url", &s.inventory_url),
            ("services.device_history_url", &s.device_history_url),
            ("services.bess_measurements_url", &s.bess_measurements_url),
            ("services.pv_measurements_url", &s.pv_measurements_url),
            ("services.bess_command_url", &s.bess_command_url),
            ("services.charging_profile_url", &s.charging_profile_url),
        ] {
            if url.trim().is_empty() {
                errors.push(error(field, "must not be empty"));
            }
        }
        if s.request_timeout_secs == 0 {
            errors.push(error("services.request_timeout_secs", "must be > 0"));
        }
        if s.command_retries > 10 {
            errors.push(error("services.command_retries", "must be <= 10"));
        }

        let a = &self.auth;
        if a.mode == AuthMode::Password {
            if a.token_url.trim().is_empty() {
                errors.push(error("auth.token_url", "required when auth.mode = \"password\""));
            }
            if a.username.is_empty() {
                errors.push(error("auth.username", "required when auth.mode = \"password\""));
            }
            if a.password.is_empty() {
                errors.push(error("auth.password", "required when auth.mode = \"password\""));
            }
        }

        errors
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.services.request_timeout_secs)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.engine.cycle_period_secs)
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval_minutes: config.engine.interval_minutes,
            safety_mode: config.engine.safety_mode,
            notification: config.engine.notification,
            throttle: Duration::from_millis(config.engine.throttle_ms),
            timeconfig_id: config.engine.timeconfig_id,
            status_minutes: config.freshness.status_minutes,
            heartbeat_minutes: config.freshness.heartbeat_minutes,
            bess_minutes: config.freshness.bess_minutes,
            pv_minutes: config.freshness.pv_minutes,
            command_retries: config.services.command_retries,
        }
    }
}
