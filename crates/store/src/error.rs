// crates/store/src/error.rs
use thiserror::Error;

/// Errors from fetching or decoding the hourly timeseries.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timeseries API returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed timeseries response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Failure reported by a non-HTTP fetcher.
    #[error("{0}")]
    Other(String),
}

impl LoadError {
    /// True for failures where calling again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LoadError::Request { .. } => true,
            LoadError::Status { status, .. } => *status >= 500 || *status == 429,
            LoadError::Decode { .. } | LoadError::Client(_) | LoadError::Other(_) => false,
        }
    }
}
