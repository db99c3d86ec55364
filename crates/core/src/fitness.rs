//! Fitness evaluation - scores an agent's observable state against a target.

use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};
use crate::state::{Position, Rgb};

/// Result of scoring one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Quality score, higher is better
    pub score: f64,

    /// Whether the state is close enough to the target to end the trial
    pub reached_goal: bool,
}

impl Evaluation {
    /// A score with no goal signal.
    pub fn score(score: f64) -> Self {
        Self { score, reached_goal: false }
    }
}

/// Computes a scalar fitness for an agent's state.
///
/// Implementations must be pure: the same inputs always give the same
/// evaluation and nothing is mutated.
pub trait FitnessEvaluator: Send + Sync {
    /// Observable state this evaluator understands.
    type State;

    /// Score `current` against `target`.
    fn evaluate(&self, current: &Self::State, target: &Self::State) -> Evaluation;
}

/// Default goal threshold for color convergence, in unit RGB space.
pub const DEFAULT_COLOR_THRESHOLD: f64 = 80.0 / 255.0;

/// Negated RGB distance between the displayed color and the target.
///
/// The goal is reached when the distance is strictly below the threshold;
/// a distance exactly equal to it is still outside. Serialized as the bare
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ColorDistance {
    threshold: f64,
}

impl ColorDistance {
    /// Evaluator with the default threshold.
    pub fn new() -> Self {
        Self { threshold: DEFAULT_COLOR_THRESHOLD }
    }

    /// Evaluator with a custom threshold, which must be finite and positive.
    pub fn with_threshold(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(CoreError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for ColorDistance {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<f64> for ColorDistance {
    type Error = CoreError;

    fn try_from(threshold: f64) -> Result<Self> {
        Self::with_threshold(threshold)
    }
}

impl From<ColorDistance> for f64 {
    fn from(evaluator: ColorDistance) -> Self {
        evaluator.threshold
    }
}

impl FitnessEvaluator for ColorDistance {
    type State = Rgb;

    fn evaluate(&self, current: &Rgb, target: &Rgb) -> Evaluation {
        let distance = current.clamped().distance(&target.clamped());
        Evaluation {
            score: -distance,
            reached_goal: distance < self.threshold,
        }
    }
}

/// Horizontal distance covered, for agents that always move the same way.
///
/// Never reports a goal; reaching the finish is an external event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceTraveled;

impl FitnessEvaluator for DistanceTraveled {
    type State = Position;

    fn evaluate(&self, current: &Position, _target: &Position) -> Evaluation {
        Evaluation::score(current.x.abs())
    }
}
