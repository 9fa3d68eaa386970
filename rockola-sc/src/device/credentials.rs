//! Device credentials provisioning
//!
//! Credentials for the remote playback engine are issued per venue by an
//! external endpoint. The adapter refreshes them ahead of expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rockola_common::{Error, Result};
use serde::Deserialize;

/// Token set for one venue's playback engine account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// External credentials collaborator
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn get(&self, venue_id: &str) -> Result<DeviceCredentials>;

    async fn refresh(&self, venue_id: &str) -> Result<DeviceCredentials>;
}

/// HTTP implementation against the configured credentials endpoint
pub struct HttpCredentialsProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCredentialsProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self, venue_id: &str, path: &str) -> Result<DeviceCredentials> {
        let url = format!(
            "{}/venues/{}/{}",
            self.base_url.trim_end_matches('/'),
            venue_id,
            path
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("credentials request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::DeviceInit(format!(
                "no playback credentials configured for venue {}",
                venue_id
            )));
        }
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "credentials endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<DeviceCredentials>()
            .await
            .map_err(|e| Error::Http(format!("invalid credentials payload: {}", e)))
    }
}

#[async_trait]
impl CredentialsProvider for HttpCredentialsProvider {
    async fn get(&self, venue_id: &str) -> Result<DeviceCredentials> {
        self.fetch(venue_id, "credentials").await
    }

    async fn refresh(&self, venue_id: &str) -> Result<DeviceCredentials> {
        self.fetch(venue_id, "credentials/refresh").await
    }
}

/// Session-local provider used with the software engine when no
/// credentials endpoint is configured. Tokens never leave the process.
pub struct LocalCredentialsProvider;

#[async_trait]
impl CredentialsProvider for LocalCredentialsProvider {
    async fn get(&self, _venue_id: &str) -> Result<DeviceCredentials> {
        Ok(DeviceCredentials {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        })
    }

    async fn refresh(&self, venue_id: &str) -> Result<DeviceCredentials> {
        self.get(venue_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_payload_shape() {
        let json = r#"{
            "accessToken": "at-1",
            "refreshToken": "rt-1",
            "expiresAt": "2026-08-06T12:00:00Z"
        }"#;
        let creds: DeviceCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.access_token, "at-1");
        assert_eq!(creds.refresh_token, "rt-1");
    }
}
