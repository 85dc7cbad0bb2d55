use thiserror::Error;

use crate::config::ConfigError;
use crate::split::SplitError;

/// Why a run stopped. Every variant is fatal; retryable failures have already
/// been retried by the time one of these is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("connection error: {0:#}")]
    Connection(anyhow::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] SplitError),
    #[error("processing error: {0}")]
    Processing(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
