//! Synchronization strategies - where new parameter sets come from.

use std::collections::VecDeque;

use evotrial_core::{Agent, Candidate};
use evotrial_optimizer::PopulateRequest;

use crate::config::{ExhaustionPolicy, SyncMode, TrialConfig};

/// Live strategy settings, forwarded to every populate request.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSync {
    /// Number of top-ranked generations considered as parents
    pub generation_count: u32,
    /// Per-value mutation probability
    pub mutation_rate: f64,
    /// Opaque optimizer switch
    pub service_flag: bool,
}

impl LiveSync {
    /// Build the populate request for an agent.
    pub fn request<S>(&self, agent: &Agent<S>) -> PopulateRequest {
        PopulateRequest {
            namespace: agent.namespace.clone(),
            parameter_names: agent.params.name_list(),
            generation_count: self.generation_count,
            mutation_rate: self.mutation_rate,
            service_flag: self.service_flag,
        }
    }
}

/// Controller-owned FIFO of pre-fetched candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBatch {
    queue: VecDeque<Candidate>,
    batch_size: usize,
    policy: ExhaustionPolicy,
}

impl CachedBatch {
    /// Empty batch with its refill size and exhaustion policy.
    pub fn new(batch_size: usize, policy: ExhaustionPolicy) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_size,
            policy,
        }
    }

    /// Append freshly fetched candidates.
    pub fn fill(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        self.queue.extend(candidates);
    }

    /// Take the next candidate in fetch order.
    pub fn pop(&mut self) -> Option<Candidate> {
        self.queue.pop_front()
    }

    /// Drop every remaining candidate.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Candidates left.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Candidates requested per prefetch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Exhaustion policy.
    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }
}

/// The one strategy an agent uses for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStrategy {
    /// Synchronous optimizer query per re-evaluation
    Live(LiveSync),
    /// Pre-fetched batch drawn on explicit triggers
    Cached(CachedBatch),
}

impl SyncStrategy {
    /// Build the strategy selected by the configuration.
    pub fn from_config(config: &TrialConfig) -> Self {
        match config.mode {
            SyncMode::Live => SyncStrategy::Live(LiveSync {
                generation_count: config.generation_count,
                mutation_rate: config.mutation_rate,
                service_flag: config.service_flag,
            }),
            SyncMode::Cached => {
                SyncStrategy::Cached(CachedBatch::new(config.batch_size, config.exhaustion))
            }
        }
    }

    /// Mode of this strategy.
    pub fn mode(&self) -> SyncMode {
        match self {
            SyncStrategy::Live(_) => SyncMode::Live,
            SyncStrategy::Cached(_) => SyncMode::Cached,
        }
    }
}
