//! Error types for the track resolution scheduler.

use thiserror::Error;

/// Errors raised by the scheduler's own surface (registration, configuration, waiting).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid context type: {0} (expected queue, hover, pool, page or sidebar)")]
    InvalidContextType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<config::ConfigError> for SchedulerError {
    fn from(err: config::ConfigError) -> Self {
        SchedulerError::Config(err.to_string())
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Outcome of a failed resolver invocation.
///
/// `Cancelled` is the cancellation marker: the processor treats it as an expected,
/// silent termination. Every other variant is an ordinary resolution error.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Resolution failed: {0}")]
    Failed(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Resolver panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResolveError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ResolveError::Cancelled)
    }

    /// Stable tag used in emitted events.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Cancelled => "cancelled",
            ResolveError::Failed(_) => "failed",
            ResolveError::Provider { .. } => "provider",
            ResolveError::Panicked(_) => "panicked",
            ResolveError::Other(_) => "other",
        }
    }
}
