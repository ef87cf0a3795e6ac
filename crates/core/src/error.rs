// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while constructing time periods.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period type: {value}")]
    InvalidGranularity { value: String },
}

/// Errors that can occur when loading analytics configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed TOML in config {}: {message}", path.display())]
    MalformedToml { path: PathBuf, message: String },

    #[error("Invalid config value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl PeriodError {
    pub fn invalid_granularity(value: impl Into<String>) -> Self {
        Self::InvalidGranularity {
            value: value.into(),
        }
    }
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_error_display() {
        let err = PeriodError::invalid_granularity("fortnight");
        assert_eq!(err.to_string(), "Invalid period type: fortnight");
    }

    #[test]
    fn test_config_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ConfigError::io("/etc/servelytics.toml", io_err);
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("/etc/servelytics.toml"));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::io("/etc/servelytics.toml", io_err);
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
