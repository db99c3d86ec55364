//! Fitness record - one sample submitted to the optimizer.

use serde::{Deserialize, Serialize};
use crate::namespace::Namespace;
use crate::params::ParameterSet;
use crate::Time;

/// An immutable `(namespace, parameters, score)` sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    namespace: Namespace,
    params: ParameterSet,
    score: f64,
    recorded_at: Time,
}

impl FitnessRecord {
    /// Capture a sample now.
    pub fn new(namespace: Namespace, params: ParameterSet, score: f64) -> Self {
        Self {
            namespace,
            params,
            score,
            recorded_at: chrono::Utc::now(),
        }
    }

    /// Optimizer namespace
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Parameters that produced the score
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Fitness score
    pub fn score(&self) -> f64 {
        self.score
    }

    /// When the sample was taken
    pub fn recorded_at(&self) -> Time {
        self.recorded_at
    }
}
