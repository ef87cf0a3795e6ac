// crates/core/src/config.rs
//! Analytics configuration: API endpoint settings and period business rules.
//!
//! Values come from an optional TOML file, then `SERVELYTICS_API_URL` and
//! `SERVELYTICS_API_TOKEN` override the API section.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub const API_URL_ENV: &str = "SERVELYTICS_API_URL";
pub const API_TOKEN_ENV: &str = "SERVELYTICS_API_TOKEN";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_TIMESERIES_PATH: &str = "analytics/timeseries/";

/// Business rules applied uniformly to every node of a period tree.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    /// How far back the baseline sample is looked up.
    pub baseline_days: u32,
    /// Multiplier applied to a period's own revenue to derive its capacity.
    pub capacity_buffer: f64,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            baseline_days: 28,
            capacity_buffer: 1.2,
        }
    }
}

/// Where the hourly timeseries is fetched from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeseries_path: String,
    /// Bearer token sent with every request, if set.
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeseries_path: DEFAULT_TIMESERIES_PATH.into(),
            token: None,
        }
    }
}

impl ApiConfig {
    /// Full URL of the timeseries endpoint.
    pub fn timeseries_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.timeseries_path.trim_start_matches('/')
        )
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub api: ApiConfig,
    pub periods: PeriodConfig,
}

impl AnalyticsConfig {
    /// Parse a TOML document. `origin` is only used in error messages.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::MalformedToml {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given (defaults otherwise), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
                Self::from_toml_str(&raw, path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        tracing::debug!(
            base_url = %config.api.base_url,
            baseline_days = config.periods.baseline_days,
            capacity_buffer = config.periods.capacity_buffer,
            "Loaded analytics config"
        );
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(url) = std::env::var(API_URL_ENV).ok().filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = std::env::var(API_TOKEN_ENV).ok().filter(|v| !v.is_empty()) {
            self.api.token = Some(token);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url",
                message: "must not be empty".into(),
            });
        }
        let buffer = self.periods.capacity_buffer;
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "periods.capacity_buffer",
                message: format!("expected a non-negative number, got {buffer}"),
            });
        }
        Ok(())
    }
}
