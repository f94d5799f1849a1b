//! Blocking HTTP clients for the inventory, telemetry and command services.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChargingProfile, CommandChannel, CommandResponse, Inventory, Telemetry, TokenSource};
use crate::config::ServicesConfig;
use crate::devices::{Bess, Evcs, Pv, Setup, TimeConfig, V2g};
use crate::error::ClientError;
use crate::telemetry::{BessMeasurement, PvMeasurement, TelemetrySample};

/// Token source shared by the telemetry and command clients.
pub type SharedTokenSource = Arc<dyn TokenSource + Send + Sync>;

/// Builds the blocking client used by every collaborator, with a request
/// timeout applied to each call.
pub fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Sends a request and decodes a 2xx JSON body.
fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Adds the `authorization` field when the token source yields one.
fn authorize(auth: &dyn TokenSource, mut payload: Value) -> Result<Value, ClientError> {
    if let (Some(token), Some(map)) = (auth.token()?, payload.as_object_mut()) {
        map.insert("authorization".to_string(), Value::String(token));
    }
    Ok(payload)
}

/// Whether an inventory record belongs to `setup_id`; ids may be numbers or
/// numeric strings.
fn belongs_to(record: &Value, setup_id: u32) -> bool {
    match record.get("setup_id") {
        Some(Value::Number(n)) => n.as_u64() == Some(u64::from(setup_id)),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok() == Some(setup_id),
        _ => false,
    }
}

/// Inventory service client. Device lists are fetched whole and filtered by
/// setup locally.
pub struct HttpInventory {
    client: Client,
    base_url: String,
}

impl HttpInventory {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches a list endpoint as raw records.
    fn list(&self, endpoint: &str) -> Result<Vec<Value>, ClientError> {
        let url = join(&self.base_url, endpoint);
        let records: Value = fetch(self.client.get(&url).header("accept", "application/json"))?;
        match records {
            Value::Array(records) => Ok(records),
            _ => Err(ClientError::InvalidRecord(format!("{url} did not return a list"))),
        }
    }

    fn list_for_setup<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        setup_id: u32,
    ) -> Result<Vec<T>, ClientError> {
        let records = self.list(endpoint)?;
        let mut devices = Vec::new();
        for record in records.into_iter().filter(|r| belongs_to(r, setup_id)) {
            match serde_json::from_value(record) {
                Ok(device) => devices.push(device),
                Err(e) => warn!(endpoint, setup_id, error = %e, "skipping malformed record"),
            }
        }
        debug!(endpoint, setup_id, count = devices.len(), "inventory listed");
        Ok(devices)
    }
}

impl Inventory for HttpInventory {
    fn get_setups(&self) -> Result<Vec<Setup>, ClientError> {
        let mut setups = Vec::new();
        for record in self.list("setups/")? {
            match serde_json::from_value(record) {
                Ok(setup) => setups.push(setup),
                Err(e) => warn!(error = %e, "skipping malformed setup record"),
            }
        }
        debug!(count = setups.len(), "setups listed");
        Ok(setups)
    }

    fn get_evcs_by_setup_id(&self, setup_id: u32) -> Result<Vec<Evcs>, ClientError> {
        self.list_for_setup("evcs/", setup_id)
    }

    fn get_bess_by_setup_id(&self, setup_id: u32) -> Result<Vec<Bess>, ClientError> {
        self.list_for_setup("bess/", setup_id)
    }

    fn get_pv_by_setup_id(&self, setup_id: u32) -> Result<Vec<Pv>, ClientError> {
        self.list_for_setup("pv/", setup_id)
    }

    fn get_v2g_by_setup_id(&self, setup_id: u32) -> Result<Vec<V2g>, ClientError> {
        self.list_for_setup("v2g/", setup_id)
    }

    fn get_timeconfig(&self, id: u32) -> Result<TimeConfig, ClientError> {
        let url = join(&self.base_url, &format!("timeconfig/{id}"));
        fetch(self.client.get(&url).header("accept", "application/json"))
    }
}

/// Device history and measurement service client.
pub struct HttpTelemetry {
    client: Client,
    history_url: String,
    bess_url: String,
    pv_url: String,
    auth: SharedTokenSource,
}

impl HttpTelemetry {
    pub fn new(client: Client, services: &ServicesConfig, auth: SharedTokenSource) -> Self {
        Self {
            client,
            history_url: services.device_history_url.clone(),
            bess_url: services.bess_measurements_url.clone(),
            pv_url: services.pv_measurements_url.clone(),
            auth,
        }
    }

    fn measurement<T: DeserializeOwned>(&self, url: &str, device_id: &str) -> Result<T, ClientError> {
        let payload = authorize(self.auth.as_ref(), json!({ "identification": device_id }))?;
        fetch(self.client.post(url).json(&payload))
    }
}

impl Telemetry for HttpTelemetry {
    fn latest_sample(
        &self,
        device_id: &str,
        attr: &str,
    ) -> Result<Option<TelemetrySample>, ClientError> {
        let payload = authorize(
            self.auth.as_ref(),
            json!({ "device_id": device_id, "attr": attr, "lastN": 1 }),
        )?;
        let samples: Vec<TelemetrySample> =
            fetch(self.client.post(&self.history_url).json(&payload))?;
        Ok(samples.into_iter().next())
    }

    fn bess_measurement(&self, device_id: &str) -> Result<BessMeasurement, ClientError> {
        self.measurement(&self.bess_url, device_id)
    }

    fn pv_measurement(&self, device_id: &str) -> Result<PvMeasurement, ClientError> {
        self.measurement(&self.pv_url, device_id)
    }
}

/// Charging-profile and battery command client.
pub struct HttpCommandChannel {
    client: Client,
    profile_url: String,
    bess_url: String,
    auth: SharedTokenSource,
}

impl HttpCommandChannel {
    pub fn new(client: Client, services: &ServicesConfig, auth: SharedTokenSource) -> Self {
        Self {
            client,
            profile_url: services.charging_profile_url.clone(),
            bess_url: services.bess_command_url.clone(),
            auth,
        }
    }
}

impl CommandChannel for HttpCommandChannel {
    fn set_charging_profile(
        &self,
        profile: &ChargingProfile,
    ) -> Result<CommandResponse, ClientError> {
        let payload = authorize(
            self.auth.as_ref(),
            json!({
                "deviceId": profile.device_id,
                "connectorId": profile.connector_id.to_string(),
                "chargingRateUnit": profile.unit.to_string(),
                "startPeriod": 0,
                "limit": profile.limit,
                "ocppProtocolVersion": profile.protocol.as_str(),
            }),
        )?;
        fetch(self.client.post(&self.profile_url).json(&payload))
    }

    fn send_power_command(
        &self,
        device_id: &str,
        power_kw: f64,
    ) -> Result<CommandResponse, ClientError> {
        let payload = authorize(
            self.auth.as_ref(),
            json!({
                "bessCommand": "inv_p_q",
                "deviceId": device_id,
                "der_identification": "identification",
                "der_type": "BESS",
                "p_manual": 1000.0 * power_kw,
                "q_manual": 0.0,
            }),
        )?;
        fetch(self.client.post(&self.bess_url).json(&payload))
    }
}
