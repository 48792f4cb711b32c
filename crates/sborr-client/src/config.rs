//! Client configuration.

use sborr_core::defaults::{EVENT_BUS_CAPACITY, HTTP_TIMEOUT_SECS, REALTIME_HEARTBEAT_SECS};
use sborr_core::{Error, Result};

/// Connection settings for a hosted SBORR project.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Project base URL, e.g. `https://xyz.example.co`.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Realtime heartbeat interval in seconds.
    pub realtime_heartbeat_secs: u64,
    /// Per-table change channel capacity.
    pub event_capacity: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            timeout_seconds: HTTP_TIMEOUT_SECS,
            realtime_heartbeat_secs: REALTIME_HEARTBEAT_SECS,
            event_capacity: EVENT_BUS_CAPACITY,
        }
    }

    /// Create from environment variables.
    ///
    /// `SBORR_URL` and `SBORR_ANON_KEY` are required; `SBORR_TIMEOUT`,
    /// `SBORR_HEARTBEAT_SECS` and `SBORR_EVENT_CAPACITY` override defaults.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SBORR_URL")
            .map_err(|_| Error::Config("SBORR_URL is not set".to_string()))?;
        let anon_key = std::env::var("SBORR_ANON_KEY")
            .map_err(|_| Error::Config("SBORR_ANON_KEY is not set".to_string()))?;

        let mut config = Self::new(url, anon_key);
        config.timeout_seconds = std::env::var("SBORR_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(HTTP_TIMEOUT_SECS);
        config.realtime_heartbeat_secs = std::env::var("SBORR_HEARTBEAT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(REALTIME_HEARTBEAT_SECS);
        config.event_capacity = std::env::var("SBORR_EVENT_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(EVENT_BUS_CAPACITY);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "SBORR_URL must be an http(s) URL, got {:?}",
                self.url
            )));
        }
        if self.anon_key.trim().is_empty() {
            return Err(Error::Config("anon key is empty".to_string()));
        }
        Ok(())
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.url)
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base,
            urlencoding::encode(&self.anon_key)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let config = ClientConfig::new("https://council.example.co/", "anon");
        assert_eq!(config.url, "https://council.example.co");
        assert_eq!(config.rest_url(), "https://council.example.co/rest/v1");
        assert_eq!(config.storage_url(), "https://council.example.co/storage/v1");
        assert_eq!(config.auth_url(), "https://council.example.co/auth/v1");
        assert_eq!(
            config.realtime_url(),
            "wss://council.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn test_plain_http_realtime_url() {
        let config = ClientConfig::new("http://127.0.0.1:54321", "a b");
        assert_eq!(
            config.realtime_url(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=a%20b&vsn=1.0.0"
        );
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::new("https://x.co", "k").validate().is_ok());
        assert!(ClientConfig::new("ftp://x.co", "k").validate().is_err());
        assert!(ClientConfig::new("https://x.co", " ").validate().is_err());
    }
}
