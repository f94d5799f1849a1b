//! Error types for collaborator calls and dispatch cycles.

use thiserror::Error;

/// Failure of a call to one of the remote collaborators (inventory,
/// telemetry, command channel, token endpoint).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed record: {0}")]
    InvalidRecord(String),

    #[error("no data: {0}")]
    NotFound(String),
}

/// Failure that prevents a dispatch cycle from completing for one setup.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("inventory lookup for {what} failed: {source}")]
    Inventory {
        what: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("time configuration {id} unavailable: {source}")]
    MissingTimeConfig {
        id: u32,
        #[source]
        source: ClientError,
    },

    #[error("invalid time configuration: {0}")]
    InvalidTimeConfig(String),

    #[error("device {device_id}: {reason}")]
    InvalidDevice { device_id: String, reason: String },
}

impl DispatchError {
    pub(crate) fn invalid_device(device_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDevice {
            device_id: device_id.to_string(),
            reason: reason.into(),
        }
    }
}
