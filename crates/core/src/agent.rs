//! Agent model - the entity under trial.

use serde::{Deserialize, Serialize};
use crate::id::AgentId;
use crate::namespace::Namespace;
use crate::params::ParameterSet;

/// Trial status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Agent is being evaluated and re-parameterized
    Active,
    /// Trial is over; the agent keeps its final state
    Concluded,
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrialStatus::Active => write!(f, "active"),
            TrialStatus::Concluded => write!(f, "concluded"),
        }
    }
}

/// An agent whose parameters are tuned by the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent<S> {
    /// Unique identifier
    pub id: AgentId,

    /// Optimizer namespace
    pub namespace: Namespace,

    /// 0 for the first agent of a trial, +1 per successor
    pub generation: u32,

    /// Optimizer-controlled parameters
    pub params: ParameterSet,

    /// Observable state, updated by the environment
    pub state: S,

    /// Trial status
    pub status: TrialStatus,
}

impl<S> Agent<S> {
    /// Create a fresh, active, generation-0 agent.
    pub fn new(namespace: Namespace, params: ParameterSet, state: S) -> Self {
        Self {
            id: AgentId::new(),
            namespace,
            generation: 0,
            params,
            state,
            status: TrialStatus::Active,
        }
    }

    /// Build the agent that replaces this one after a failed attempt.
    ///
    /// Same namespace, next generation, state reset to `origin`. The
    /// parameter values carry over until the caller populates them.
    pub fn successor(&self, origin: S) -> Self {
        Self {
            id: AgentId::new(),
            namespace: self.namespace.clone(),
            generation: self.generation + 1,
            params: self.params.clone(),
            state: origin,
            status: TrialStatus::Active,
        }
    }

    /// Whether the trial is still running.
    pub fn is_active(&self) -> bool {
        self.status == TrialStatus::Active
    }

    /// Mark the trial as over.
    pub fn conclude(&mut self) {
        self.status = TrialStatus::Concluded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Position;

    fn runner() -> Agent<Position> {
        Agent::new(
            Namespace::new("Runner").unwrap(),
            ParameterSet::new([("speed", 10.0)]).unwrap(),
            Position::new(42.0, 0.0),
        )
    }

    #[test]
    fn test_new_agent_is_active() {
        let agent = runner();
        assert!(agent.is_active());
        assert_eq!(agent.generation, 0);
    }

    #[test]
    fn test_successor_resets_state_and_keeps_namespace() {
        let mut agent = runner();
        agent.conclude();
        let next = agent.successor(Position::new(0.0, 2.0));

        assert_ne!(next.id, agent.id);
        assert_eq!(next.namespace, agent.namespace);
        assert_eq!(next.generation, 1);
        assert_eq!(next.state, Position::new(0.0, 2.0));
        assert_eq!(next.params, agent.params);
        assert!(next.is_active());
    }
}
