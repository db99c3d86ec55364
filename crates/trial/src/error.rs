//! Trial errors.

use std::time::Duration;

use evotrial_core::{CoreError, Namespace};
use evotrial_optimizer::OptimizerError;

/// Result type for trial operations.
pub type Result<T> = std::result::Result<T, TrialError>;

/// Errors surfaced by the trial layer.
///
/// Only start-up, reset and configuration problems reach callers; errors
/// during ticks and events are logged and absorbed by the controller.
#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    /// Optimizer unreachable when the trial starts
    #[error("optimizer unreachable, cannot start trial for {0}")]
    Connectivity(Namespace),

    /// Optimizer call failed
    #[error("optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Optimizer call did not finish in time
    #[error("optimizer {call} timed out after {after:?}")]
    Timeout {
        /// Which call
        call: &'static str,
        /// Configured limit
        after: Duration,
    },

    /// Configuration rejected by validation
    #[error("invalid trial configuration: {0}")]
    InvalidConfig(String),

    /// Core value construction failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The runner task has stopped
    #[error("trial runner is no longer running")]
    RunnerClosed,
}
