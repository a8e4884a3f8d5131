use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::config::HealthConfig;

/// Body of the scorer's `GET /health`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("invalid health URL `{url}`: {reason}")]
    Url { url: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Minimal client for the upstream scorer's health endpoint.
pub struct UpstreamHealth {
    url: Url,
    client: Client,
}

impl UpstreamHealth {
    /// Uses `config.url` when set, otherwise derives it from the stream URL.
    pub fn from_config(config: &HealthConfig, stream_url: &str) -> Result<Self, HealthError> {
        let url = match &config.url {
            Some(explicit) => Url::parse(explicit).map_err(|e| HealthError::Url {
                url: explicit.clone(),
                reason: e.to_string(),
            })?,
            None => health_url_for(stream_url)?,
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn check(&self) -> Result<HealthStatus, HealthError> {
        let resp = self.client.get(self.url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(HealthError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }
}

/// `ws://host:port/ws/stream` -> `http://host:port/health` (wss -> https).
pub fn health_url_for(stream_url: &str) -> Result<Url, HealthError> {
    let invalid = |reason: String| HealthError::Url {
        url: stream_url.to_string(),
        reason,
    };
    let mut url = Url::parse(stream_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(invalid(format!("unsupported scheme `{other}`"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch to {scheme}")))?;
    url.set_path("/health");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
