//! evotrial core data models.
//!
//! This crate defines the agent, its optimizer-controlled parameters and
//! the fitness evaluators that score it. Nothing here talks to the
//! optimizer.

#![warn(missing_docs)]

// Identity
mod id;
mod namespace;
mod error;

// Agent and parameters
mod params;
mod agent;
mod state;

// Scoring
mod fitness;
mod record;

// Re-exports
pub use id::AgentId;
pub use namespace::Namespace;
pub use error::{CoreError, Result};

pub use params::{Candidate, ParameterSet, OverwriteReport};
pub use agent::{Agent, TrialStatus};
pub use state::{Position, Rgb};

pub use fitness::{
    FitnessEvaluator, Evaluation, ColorDistance, DistanceTraveled, DEFAULT_COLOR_THRESHOLD,
};
pub use record::FitnessRecord;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
