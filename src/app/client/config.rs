//! HTTP client and session configuration
//!
//! This module handles the configuration and construction of HTTP clients
//! used for Earth Engine REST calls and pixel downloads.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app::retry::RetryPolicy;
use crate::constants::{auth, earthengine, http, imagery};
use crate::errors::{AuthError, AuthResult};

/// Configuration for HTTP client optimizations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> AuthResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(AuthError::Http)
    }
}

/// Everything needed to open an Earth Engine session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST endpoint root, the high-volume endpoint by default
    pub api_base_url: String,
    /// Cloud project; falls back to the environment and the metadata server
    pub project: Option<String>,
    /// OAuth2 scopes requested for tokens
    pub scopes: Vec<String>,
    /// Ground distance of one pixel for the patch accessors, in meters
    pub scale: f64,
    pub client: ClientConfig,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: earthengine::HIGH_VOLUME_URL.to_string(),
            project: None,
            scopes: auth::SCOPES.iter().map(|scope| scope.to_string()).collect(),
            scale: imagery::DEFAULT_SCALE_M,
            client: ClientConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Default configuration against a different endpoint
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Default::default()
        }
    }

    pub(crate) fn scope_refs(&self) -> Vec<&str> {
        self.scopes.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.pool_max_per_host, http::POOL_MAX_PER_HOST);
        assert_eq!(config.request_timeout, http::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_http_client_with_custom_config() {
        let config = ClientConfig {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tcp_keepalive: None,
            ..Default::default()
        };

        assert!(config.build_http_client().is_ok());
    }

    #[test]
    fn test_session_config_targets_high_volume_endpoint() {
        let config = SessionConfig::default();
        assert_eq!(config.api_base_url, earthengine::HIGH_VOLUME_URL);
        assert_eq!(config.scope_refs(), auth::SCOPES.to_vec());
        assert_eq!(config.scale, 100.0);
        assert_eq!(config.retry.deadline, Duration::from_secs(600));

        let local = SessionConfig::with_base_url("http://127.0.0.1:8080");
        assert_eq!(local.api_base_url, "http://127.0.0.1:8080");
        assert_eq!(local.project, None);
    }
}
