//! Configuration management for OrbitTrack.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrbitTrackError, Result};
use crate::ratelimit::{
    default_hourly_limit, default_minute_limit, RateLimiter, RateWindowSpec, Strategy, WaitMode,
    DEFAULT_NAMESPACE, HOUR_WINDOW, MINUTE_WINDOW,
};
use crate::session::Credentials;
use crate::transport::DEFAULT_BASE_URL;

/// Prefix of environment overrides, e.g. `ORBITTRACK__API__BASE_URL`.
pub const ENV_PREFIX: &str = "ORBITTRACK";
pub const IDENTITY_ENV: &str = "ORBITTRACK_IDENTITY";
pub const PASSWORD_ENV: &str = "ORBITTRACK_PASSWORD";

/// Main configuration for an OrbitTrack client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Named windows, e.g. `minute: "30/minute"`
    #[serde(default = "default_windows")]
    pub windows: BTreeMap<String, RateWindowSpec>,

    #[serde(default)]
    pub strategy: Strategy,

    /// Wait for headroom instead of failing
    #[serde(default = "default_wait")]
    pub wait: bool,

    /// Upper bound on the total wait per request
    #[serde(default)]
    pub max_wait_secs: Option<u64>,

    /// Store key prefix; clients sharing a store and a namespace share quota
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            strategy: Strategy::default(),
            wait: default_wait(),
            max_wait_secs: None,
            namespace: default_namespace(),
        }
    }
}

fn default_windows() -> BTreeMap<String, RateWindowSpec> {
    BTreeMap::from([
        (MINUTE_WINDOW.to_string(), default_minute_limit()),
        (HOUR_WINDOW.to_string(), default_hourly_limit()),
    ])
}

fn default_wait() -> bool {
    true
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl RateLimitingConfig {
    pub fn wait_mode(&self) -> WaitMode {
        match (self.wait, self.max_wait_secs) {
            (false, _) => WaitMode::NoWait,
            (true, None) => WaitMode::Wait,
            (true, Some(secs)) => WaitMode::WaitAtMost(std::time::Duration::from_secs(secs)),
        }
    }

    /// Push every setting into `limiter`.
    pub fn apply(&self, limiter: &RateLimiter) {
        limiter.set_windows(self.windows.clone());
        limiter.set_strategy(self.strategy);
        limiter.set_wait_mode(self.wait_mode());
        limiter.set_namespace(self.namespace.clone());
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig =
            serde_yaml::from_str(&contents).map_err(|e| OrbitTrackError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Defaults, overlaid by an optional file, overlaid by `ORBITTRACK__*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&ClientConfig::default())
            .map_err(|e| OrbitTrackError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| OrbitTrackError::Config(e.to_string()))
    }
}

/// Read credentials from `ORBITTRACK_IDENTITY` and `ORBITTRACK_PASSWORD`.
pub fn credentials_from_env() -> Result<Credentials> {
    let read = |name: &str| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OrbitTrackError::Config(format!("{name} is not set")))
    };
    Ok(Credentials::new(read(IDENTITY_ENV)?, read(PASSWORD_ENV)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("orbittrack-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, "https://www.space-track.org");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert_eq!(config.rate_limiting.windows["minute"], RateWindowSpec::per_minute(30));
        assert_eq!(config.rate_limiting.windows["hour"], RateWindowSpec::per_hour(300));
        assert_eq!(config.rate_limiting.wait_mode(), WaitMode::Wait);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ClientConfig = serde_yaml::from_str(
            r#"
rate_limiting:
  windows:
    minute: "20/minute"
  strategy: fixed_window
  max_wait_secs: 90
"#,
        )
        .unwrap();

        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.rate_limiting.windows.len(), 1);
        assert_eq!(config.rate_limiting.strategy, Strategy::FixedWindow);
        assert_eq!(
            config.rate_limiting.wait_mode(),
            WaitMode::WaitAtMost(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_invalid_window_is_config_error() {
        let path = write_temp("rate_limiting:\n  windows:\n    minute: \"lots\"\n");
        let err = ClientConfig::from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, OrbitTrackError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ClientConfig::from_file("/nonexistent/orbittrack.yaml").unwrap_err();
        assert!(matches!(err, OrbitTrackError::Io(_)));
    }

    #[test]
    fn test_apply_configures_limiter() {
        let limiter = RateLimiter::new();
        let config = RateLimitingConfig {
            windows: BTreeMap::from([("burst".to_string(), RateWindowSpec::per_second(1))]),
            strategy: Strategy::FixedWindow,
            wait: false,
            max_wait_secs: Some(5),
            namespace: "tests".to_string(),
        };

        config.apply(&limiter);

        assert_eq!(limiter.windows().len(), 1);
        assert_eq!(limiter.strategy(), Strategy::FixedWindow);
        assert_eq!(limiter.wait_mode(), WaitMode::NoWait);
    }

    // Environment variables are process-wide, so every `load` case lives in
    // this one test.
    #[test]
    fn test_load_layers_file_and_environment() {
        let path = write_temp(
            "api:\n  request_timeout_secs: 30\nrate_limiting:\n  windows:\n    minute: \"10/minute\"\n",
        );
        std::env::set_var("ORBITTRACK__RATE_LIMITING__WAIT", "false");
        std::env::set_var("ORBITTRACK__API__BASE_URL", "http://localhost:9999");

        let config = ClientConfig::load(Some(&path)).unwrap();

        std::env::remove_var("ORBITTRACK__RATE_LIMITING__WAIT");
        std::env::remove_var("ORBITTRACK__API__BASE_URL");
        std::fs::remove_file(&path).ok();

        assert_eq!(config.api.base_url, "http://localhost:9999");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.api.connect_timeout_secs, 5);
        assert_eq!(config.rate_limiting.windows["minute"], RateWindowSpec::per_minute(10));
        // Tables merge, so the default hourly window survives
        assert_eq!(config.rate_limiting.windows["hour"], RateWindowSpec::per_hour(300));
        assert!(!config.rate_limiting.wait);

        let defaults = ClientConfig::load(None).unwrap();
        assert_eq!(defaults, ClientConfig::default());
    }

    #[test]
    fn test_credentials_from_env() {
        std::env::set_var(IDENTITY_ENV, "user@example.com");
        std::env::set_var(PASSWORD_ENV, "hunter2");
        let credentials = credentials_from_env().unwrap();
        assert_eq!(credentials.identity(), "user@example.com");

        std::env::remove_var(PASSWORD_ENV);
        assert!(matches!(credentials_from_env(), Err(OrbitTrackError::Config(_))));
        std::env::remove_var(IDENTITY_ENV);
    }
}
