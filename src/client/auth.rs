//! Access tokens for the telemetry and command services.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::TokenSource;
use crate::error::ClientError;

/// Sends requests without an `authorization` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl TokenSource for NoAuth {
    fn token(&self) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}

/// Refresh this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    valid_until: Option<Instant>,
}

/// OpenID Connect password grant, cached until shortly before expiry.
pub struct PasswordGrant {
    client: Client,
    token_url: String,
    client_id: String,
    username: String,
    password: String,
    cached: Mutex<Option<CachedToken>>,
}

impl PasswordGrant {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    fn fetch(&self) -> Result<CachedToken, ClientError> {
        debug!(url = %self.token_url, "requesting access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "password"),
                ("scope", "openid"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let body: TokenResponse = response.json()?;
        let value = body
            .access_token
            .ok_or_else(|| ClientError::Auth("response has no access_token".to_string()))?;
        let valid_until = body
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN));
        info!(expires_in = ?body.expires_in, "access token acquired");
        Ok(CachedToken { value, valid_until })
    }
}

impl TokenSource for PasswordGrant {
    fn token(&self) -> Result<Option<String>, ClientError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| ClientError::Auth("token cache poisoned".to_string()))?;

        let fresh = cached
            .as_ref()
            .is_some_and(|t| t.valid_until.is_some_and(|until| Instant::now() < until));
        if !fresh {
            *cached = Some(self.fetch()?);
        }
        Ok(cached.as_ref().map(|t| t.value.clone()))
    }
}
