//! Optimizer client trait abstraction.

use async_trait::async_trait;
use evotrial_core::{Candidate, FitnessRecord, Namespace};
use serde::{Deserialize, Serialize};

/// Error type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Errors that can occur while talking to the optimizer.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    /// Service could not be reached
    #[error("optimizer unreachable: {0}")]
    Unreachable(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-success status
    #[error("optimizer rejected request (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Parameters of one live optimization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateRequest {
    /// Optimizer namespace
    pub namespace: Namespace,

    /// Names the optimizer must assign
    pub parameter_names: Vec<String>,

    /// Number of top-ranked generations considered as parents
    pub generation_count: u32,

    /// Probability of perturbing each returned value
    pub mutation_rate: f64,

    /// Opaque service-defined switch, forwarded unchanged
    pub service_flag: bool,
}

/// Client side of the remote evolutionary optimizer.
///
/// Implementations own all namespace history; callers only submit
/// samples and ask for candidates.
#[async_trait]
pub trait OptimizerClient: Send + Sync {
    /// Whether the service is reachable.
    async fn has_connectivity(&self) -> bool;

    /// Erase fitness history for a namespace. Idempotent.
    async fn clear_history(&self, namespace: &Namespace) -> Result<()>;

    /// Record one fitness sample.
    async fn submit_score(&self, record: &FitnessRecord) -> Result<()>;

    /// Run one optimization step and return the resulting assignment.
    async fn populate_live(&self, request: &PopulateRequest) -> Result<Candidate>;

    /// Pre-generate `count` candidates for the namespace. The batch also
    /// replaces the service-side cache.
    async fn prefetch_batch(
        &self,
        namespace: &Namespace,
        parameter_names: &[String],
        count: usize,
    ) -> Result<Vec<Candidate>>;

    /// Consume one service-side cached candidate, `None` when none is left.
    async fn draw_from_cache(&self, namespace: &Namespace) -> Result<Option<Candidate>>;
}
