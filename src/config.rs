//! Configuration management for the land-cover fetcher
//!
//! This module provides TOML configuration with multi-source loading and
//! zero-config defaults. Every section is optional; missing values fall back
//! to the defaults in `constants`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::retry::RetryConfigToml;
use crate::app::{ClientConfig, SessionConfig};
use crate::constants::{auth, earthengine, files, http, imagery};
use crate::errors::{ConfigError, ConfigResult};

/// Default patch side length for the CLI, in pixels
const DEFAULT_PATCH_SIZE: u32 = 64;

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Earth Engine session settings
    pub session: SessionConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Patch download retry settings
    pub retry: RetryConfigToml,
    /// Patch geometry defaults
    pub patch: PatchConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfigToml {
    /// REST endpoint root
    pub api_base_url: String,
    /// Cloud project (None = environment or metadata server)
    pub project: Option<String>,
}

impl Default for SessionConfigToml {
    fn default() -> Self {
        Self {
            api_base_url: earthengine::HIGH_VOLUME_URL.to_string(),
            project: None,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout in seconds, per attempt
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
        }
    }
}

/// TOML-friendly patch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfigToml {
    /// Ground distance of one pixel, in meters
    pub scale_m: f64,
    /// Patch side length in pixels when the CLI is not given one
    pub patch_size: u32,
}

impl Default for PatchConfigToml {
    fn default() -> Self {
        Self {
            scale_m: imagery::DEFAULT_SCALE_M,
            patch_size: DEFAULT_PATCH_SIZE,
        }
    }
}

/// Runtime patch defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchDefaults {
    pub patch_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no CLI verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Explicit config file (must exist)
    /// 2. `./landcover-fetcher.toml`
    /// 3. `<config dir>/landcover-fetcher/config.toml`
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an explicit file is missing, a file cannot be
    /// read or parsed, or a value is out of range
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound { path }),
            Some(path) => Some(path),
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(files::LOCAL_CONFIG_FILE)];
        if let Some(path) = Self::get_default_config_path() {
            search_paths.push(path);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(files::CONFIG_DIR_NAME).join(files::CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Checks values that would only fail later, deep inside a request
    pub fn validate(&self) -> ConfigResult<()> {
        if let Err(e) = Url::parse(&self.session.api_base_url) {
            return Err(ConfigError::InvalidValue {
                field: "session.api_base_url".to_string(),
                value: self.session.api_base_url.clone(),
                reason: e.to_string(),
            });
        }
        if !self.patch.scale_m.is_finite() || self.patch.scale_m <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "patch.scale_m".to_string(),
                value: self.patch.scale_m.to_string(),
                reason: "Scale must be a positive number of meters".to_string(),
            });
        }
        if self.patch.patch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "patch.patch_size".to_string(),
                value: "0".to_string(),
                reason: "Patch size must be greater than 0".to_string(),
            });
        }
        if self.retry.deadline_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.deadline_secs".to_string(),
                value: "0".to_string(),
                reason: "Deadline must allow at least one attempt".to_string(),
            });
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.multiplier".to_string(),
                value: self.retry.multiplier.to_string(),
                reason: "Backoff multiplier must be at least 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Convert TOML-friendly configuration to the runtime session configuration
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            api_base_url: self.session.api_base_url.clone(),
            project: self.session.project.clone(),
            scopes: auth::SCOPES.iter().map(|scope| scope.to_string()).collect(),
            scale: self.patch.scale_m,
            client: self.client.to_runtime_config(),
            retry: self.retry.to_runtime_config(),
        }
    }

    pub fn patch_defaults(&self) -> PatchDefaults {
        PatchDefaults {
            patch_size: self.patch.patch_size,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.session.api_base_url, earthengine::HIGH_VOLUME_URL);
        assert_eq!(config.patch.scale_m, 100.0);
        assert_eq!(config.retry.deadline_secs, 600);
        assert_eq!(config.logging.level, "warn");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_loading_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_config_loading_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let test_config = r#"
[session]
project = "landcover-project"

[retry]
deadline_secs = 120

[patch]
patch_size = 128

[logging]
level = "debug"
"#;

        tokio::fs::write(&config_path, test_config).await.unwrap();

        let config = AppConfig::load(Some(config_path)).await.unwrap();

        assert_eq!(config.session.project.as_deref(), Some("landcover-project"));
        assert_eq!(config.patch.patch_size, 128);
        assert_eq!(config.logging.level, "debug");

        // Unspecified values keep their defaults
        assert_eq!(config.session.api_base_url, earthengine::HIGH_VOLUME_URL);
        assert_eq!(config.retry.initial_interval_ms, 1000);

        let session = config.to_session_config();
        assert_eq!(session.retry.deadline, Duration::from_secs(120));
        assert_eq!(session.project.as_deref(), Some("landcover-project"));
        assert_eq!(session.scale, 100.0);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        tokio::fs::write(&config_path, "[patch\nscale_m = ").await.unwrap();

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("zero.toml");
        tokio::fs::write(&config_path, "[patch]\nscale_m = 0.0\n").await.unwrap();

        match AppConfig::load(Some(config_path)).await {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "patch.scale_m"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_client_config_conversion() {
        let toml_config = ClientConfigToml {
            tcp_keepalive_secs: None,
            request_timeout_secs: 15,
            ..Default::default()
        };
        let runtime = toml_config.to_runtime_config();

        assert_eq!(runtime.tcp_keepalive, None);
        assert_eq!(runtime.request_timeout, Duration::from_secs(15));
    }
}
