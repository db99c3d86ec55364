//! Toy obstacle course for the runner demo.
//!
//! The runner moves along +x at `speed` and jumps once it is within
//! `jump_distance_threshold` of the next obstacle. A jump clears the
//! obstacle when it is high enough and lands past the obstacle's far edge.

use evotrial_core::{ParameterSet, Position};
use evotrial_optimizer::{Bounds, InMemoryOptimizer};

const GRAVITY: f64 = 30.0;
const MASS: f64 = 65.0;

/// Declared runner parameters with their starting values.
pub const RUNNER_PARAMETERS: [(&str, f64); 3] = [
    ("speed", 10.0),
    ("jump_distance_threshold", 1.0),
    ("jump_force", 650.0),
];

/// Where every attempt starts.
pub const SPAWN: Position = Position { x: 0.0, y: 2.0 };

/// A box on the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// Near edge
    pub x: f64,
    /// Extent along the track
    pub width: f64,
    /// Height to clear
    pub height: f64,
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunResult {
    /// Reached the finish line
    Finished,
    /// Hit an obstacle at this position
    Crashed(Position),
}

/// Fixed track with a finish line.
#[derive(Debug, Clone)]
pub struct Course {
    obstacles: Vec<Obstacle>,
    finish: f64,
}

impl Course {
    /// Standard track ending at `finish`.
    pub fn new(finish: f64) -> Self {
        let obstacles = [(8.0, 1.0, 1.0), (15.0, 1.5, 1.5), (24.0, 1.0, 2.5), (31.0, 3.0, 1.2)]
            .into_iter()
            .filter(|(x, _, _)| *x < finish)
            .map(|(x, width, height)| Obstacle { x, width, height })
            .collect();
        Self { obstacles, finish }
    }

    /// Finish line.
    pub fn finish(&self) -> f64 {
        self.finish
    }

    /// Simulate one attempt with the given parameters.
    pub fn run(&self, params: &ParameterSet) -> RunResult {
        let value = |name: &str| {
            params
                .get(name)
                .or_else(|| RUNNER_PARAMETERS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v))
                .unwrap_or(0.0)
        };
        let speed = value("speed");
        let threshold = value("jump_distance_threshold").max(0.0);
        let vy = value("jump_force") / MASS;

        if speed <= 0.0 {
            return RunResult::Crashed(SPAWN);
        }

        let peak = vy * vy / (2.0 * GRAVITY);
        let reach = speed * 2.0 * vy.max(0.0) / GRAVITY;

        let mut x = SPAWN.x;
        for obstacle in &self.obstacles {
            if x >= obstacle.x + obstacle.width {
                // Passed over within the previous jump
                if peak < obstacle.height {
                    return RunResult::Crashed(Position::new(obstacle.x, 0.0));
                }
                continue;
            }
            if x > obstacle.x {
                return RunResult::Crashed(Position::new(x, 0.0));
            }

            let takeoff = (obstacle.x - threshold).max(x);
            let gap = obstacle.x - takeoff;
            if peak < obstacle.height || reach < gap + obstacle.width {
                return RunResult::Crashed(Position::new(obstacle.x, 0.0));
            }
            x = takeoff + reach;
        }

        RunResult::Finished
    }
}

/// Reference optimizer with value ranges suited to the runner.
pub fn runner_optimizer() -> InMemoryOptimizer {
    InMemoryOptimizer::new()
        .with_bounds("speed", Bounds::new(1.0, 20.0))
        .with_bounds("jump_distance_threshold", Bounds::new(0.1, 4.0))
        .with_bounds("jump_force", Bounds::new(200.0, 1200.0))
}
