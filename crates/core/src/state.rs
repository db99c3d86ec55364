//! Observable agent state types used by the built-in evaluators.

use serde::{Deserialize, Serialize};
use crate::params::ParameterSet;

/// An RGB color with channels nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel
    pub r: f64,
    /// Green channel
    pub g: f64,
    /// Blue channel
    pub b: f64,
}

impl Rgb {
    /// Create a color.
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Color as displayed: every channel limited to `[0, 1]`.
    pub fn clamped(&self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
        }
    }

    /// Euclidean distance between two colors in RGB space.
    pub fn distance(&self, other: &Rgb) -> f64 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Read the `red`, `green` and `blue` parameters of a set.
    ///
    /// Channels the set does not declare read as 0.
    pub fn from_parameters(params: &ParameterSet) -> Self {
        Self {
            r: params.get("red").unwrap_or(0.0),
            g: params.get("green").unwrap_or(0.0),
            b: params.get("blue").unwrap_or(0.0),
        }
        .clamped()
    }
}

/// A 2D position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
