//! Error handling for autorecon
//!
//! Only configuration-level faults surface as [`ReconError`]. Probe units and
//! technique adapters classify their own failures into status values (see
//! [`crate::techniques::TechniqueStatus`]) so a single broken tool or an
//! unreachable host never aborts a task.

use thiserror::Error;

/// Main error type for reconnaissance runs
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for ReconError {
    fn from(err: reqwest::Error) -> Self {
        ReconError::HttpClientError(err.to_string())
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::ParseError(err.to_string())
    }
}
