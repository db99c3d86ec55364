//! Trial controller - the per-agent control loop.
//!
//! Runs the cycle:
//! ```text
//! Evaluate → Submit score → (goal?) Conclude | Populate → repeat
//! ```
//! and reacts to the terminal events raised by the environment. Every
//! optimizer failure is absorbed here; callers only see outcomes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use evotrial_core::{
    Agent, AgentId, Candidate, FitnessEvaluator, FitnessRecord, Namespace, ParameterSet,
    TrialStatus,
};
use evotrial_optimizer::OptimizerClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{ExhaustionPolicy, SyncMode, TrialConfig};
use crate::error::{Result, TrialError};
use crate::strategy::SyncStrategy;

/// What happened to the agent's parameters during an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Population {
    /// A new candidate was written
    Applied,
    /// The call failed or the candidate was unusable; previous values kept
    Retained,
    /// The strategy does not populate on this path
    Skipped,
}

/// Result of one periodic re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Score submitted and parameters re-populated
    Continued {
        /// Submitted score
        score: f64,
        /// Whether the optimizer accepted the sample
        submitted: bool,
        /// Parameter update result
        population: Population,
    },
    /// Goal reached on this tick; the trial is over
    Concluded {
        /// Final score
        score: f64,
        /// Whether the optimizer accepted the sample
        submitted: bool,
    },
    /// Trial already concluded, nothing was done
    Suppressed,
    /// Another optimizer exchange was still outstanding
    Dropped,
}

/// Result of a cache draw trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Next candidate applied
    Applied {
        /// Candidates left in the batch
        remaining: usize,
    },
    /// Batch was empty, a new one was fetched and its first candidate applied
    Refetched {
        /// Candidates left in the batch
        remaining: usize,
    },
    /// No candidate available; parameters untouched
    Exhausted,
    /// Candidate was malformed; parameters untouched
    Rejected,
    /// Agent uses the live strategy
    NotCached,
    /// Trial already concluded
    Inactive,
}

/// Replacement of a failed agent by its successor.
#[derive(Debug, Clone, PartialEq)]
pub struct Succession {
    /// Agent that failed and was retired
    pub retired: AgentId,
    /// Newly spawned agent
    pub successor: AgentId,
    /// Successor's generation
    pub generation: u32,
    /// Score submitted for the retired agent
    pub final_score: f64,
    /// Whether that final score reached the optimizer
    pub submitted: bool,
    /// Successor's initial parameters
    pub params: ParameterSet,
    /// How those parameters were obtained
    pub population: Population,
}

/// End of a trial by success.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conclusion {
    /// Submitted ceiling score
    pub score: f64,
    /// Whether the optimizer accepted it
    pub submitted: bool,
}

/// Counters kept by a controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStats {
    /// Ticks that evaluated the agent
    pub ticks: u64,
    /// Ticks ignored because the trial had concluded
    pub suppressed_ticks: u64,
    /// Accepted score submissions
    pub submissions: u64,
    /// Failed or timed out submissions
    pub failed_submissions: u64,
    /// Candidates written into the parameter set
    pub populations: u64,
    /// Populate calls or draws whose result was not applied
    pub population_failures: u64,
    /// Candidates taken from the cached batch
    pub draws: u64,
    /// Draws that found no candidate
    pub exhausted_draws: u64,
    /// Successors spawned after failures
    pub successors: u64,
}

/// Run an optimizer call under the exchange timeout.
async fn bounded<T>(
    limit: Duration,
    call: &'static str,
    fut: impl Future<Output = evotrial_optimizer::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(TrialError::from),
        Err(_) => Err(TrialError::Timeout { call, after: limit }),
    }
}

/// Collects what a controller needs before it can start.
pub struct TrialBuilder<E: FitnessEvaluator> {
    agent: Agent<E::State>,
    evaluator: E,
    target: E::State,
    origin: Option<E::State>,
    config: TrialConfig,
}

impl<E> TrialBuilder<E>
where
    E: FitnessEvaluator,
    E::State: Clone,
{
    /// State successors are reset to (defaults to the agent's initial state).
    pub fn with_origin(mut self, origin: E::State) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: TrialConfig) -> Self {
        self.config = config;
        self
    }

    /// Check connectivity, prepare the strategy and return a running controller.
    ///
    /// Fails with [`TrialError::Connectivity`] when the optimizer cannot be
    /// reached: no agent runs without its optimizer.
    pub async fn start(self, client: Arc<dyn OptimizerClient>) -> Result<TrialController<E>> {
        self.config.validate()?;

        let limit = self.config.exchange_timeout;
        let namespace = self.agent.namespace.clone();
        let reachable = matches!(
            tokio::time::timeout(limit, client.has_connectivity()).await,
            Ok(true)
        );
        if !reachable {
            error!("Connection to the optimizer failed, not starting {}", namespace);
            return Err(TrialError::Connectivity(namespace));
        }

        let origin = self.origin.unwrap_or_else(|| self.agent.state.clone());
        let strategy = SyncStrategy::from_config(&self.config);
        let clear = self.config.clear_history_on_start && strategy.mode() == SyncMode::Live;

        let mut controller = TrialController {
            initial_params: self.agent.params.clone(),
            agent: self.agent,
            evaluator: self.evaluator,
            target: self.target,
            origin,
            strategy,
            config: self.config,
            client,
            stats: TrialStats::default(),
        };

        controller.bootstrap(clear).await?;
        info!(
            "Started {:?} trial for {} (agent {})",
            controller.strategy.mode(),
            namespace,
            controller.agent.id
        );
        Ok(controller)
    }
}

/// Owns one agent's lifecycle against the optimizer.
pub struct TrialController<E: FitnessEvaluator> {
    agent: Agent<E::State>,
    initial_params: ParameterSet,
    evaluator: E,
    target: E::State,
    origin: E::State,
    strategy: SyncStrategy,
    config: TrialConfig,
    client: Arc<dyn OptimizerClient>,
    stats: TrialStats,
}

impl<E> TrialController<E>
where
    E: FitnessEvaluator,
    E::State: Clone,
{
    /// Begin building a controller for `agent`, scored against `target`.
    pub fn builder(agent: Agent<E::State>, evaluator: E, target: E::State) -> TrialBuilder<E> {
        TrialBuilder {
            agent,
            evaluator,
            target,
            origin: None,
            config: TrialConfig::default(),
        }
    }

    // === Lifecycle events ===

    /// Periodic re-evaluation.
    ///
    /// Evaluates, submits the score for the parameters that produced it,
    /// then either concludes (goal reached) or re-populates.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.agent.is_active() {
            self.stats.suppressed_ticks += 1;
            debug!("Tick suppressed for concluded agent {}", self.agent.id);
            return TickOutcome::Suppressed;
        }

        self.stats.ticks += 1;
        let evaluation = self.evaluator.evaluate(&self.agent.state, &self.target);
        let submitted = self.submit(evaluation.score).await;

        if evaluation.reached_goal {
            self.agent.conclude();
            info!(
                "Agent {} of {} reached its goal with score {:.4}",
                self.agent.id, self.agent.namespace, evaluation.score
            );
            return TickOutcome::Concluded { score: evaluation.score, submitted };
        }

        let population = match self.strategy.mode() {
            SyncMode::Live => self.populate_live().await,
            SyncMode::Cached => Population::Skipped,
        };

        TickOutcome::Continued { score: evaluation.score, submitted, population }
    }

    /// Terminal failure: submit the partial score, spawn the successor,
    /// retire the current agent.
    ///
    /// Returns `None` when the trial had already concluded.
    pub async fn on_failure(&mut self) -> Option<Succession> {
        if !self.agent.is_active() {
            debug!("Ignoring failure event for concluded agent {}", self.agent.id);
            return None;
        }

        let final_score = self.evaluator.evaluate(&self.agent.state, &self.target).score;
        info!(
            "Agent {} of {} (generation {}) failed with score {:.4}",
            self.agent.id, self.agent.namespace, self.agent.generation, final_score
        );

        // Final sample goes out before the agent is retired
        let submitted = self.submit(final_score).await;

        let successor = self.agent.successor(self.origin.clone());
        let retired = std::mem::replace(&mut self.agent, successor);

        let population = match self.strategy.mode() {
            SyncMode::Live => self.populate_live().await,
            SyncMode::Cached => match self.trigger_draw().await {
                DrawOutcome::Applied { .. } | DrawOutcome::Refetched { .. } => Population::Applied,
                _ => Population::Retained,
            },
        };
        self.stats.successors += 1;

        let succession = Succession {
            retired: retired.id,
            successor: self.agent.id,
            generation: self.agent.generation,
            final_score,
            submitted,
            params: self.agent.params.clone(),
            population,
        };
        info!(
            "Retired agent {}; successor {} (generation {}) starts with {}",
            succession.retired, succession.successor, succession.generation, succession.params
        );
        Some(succession)
    }

    /// Terminal success: submit the ceiling score once and conclude.
    ///
    /// Returns `None` when the trial had already concluded.
    pub async fn on_success(&mut self) -> Option<Conclusion> {
        if !self.agent.is_active() {
            debug!("Ignoring success event for concluded agent {}", self.agent.id);
            return None;
        }

        let score = self.config.success_score;
        let submitted = self.submit(score).await;
        self.agent.conclude();
        info!(
            "Agent {} of {} cleared the course (generation {})",
            self.agent.id, self.agent.namespace, self.agent.generation
        );
        Some(Conclusion { score, submitted })
    }

    /// Apply the next cached candidate.
    pub async fn trigger_draw(&mut self) -> DrawOutcome {
        if !self.agent.is_active() {
            return DrawOutcome::Inactive;
        }

        let (next, policy) = match &mut self.strategy {
            SyncStrategy::Cached(batch) => (batch.pop(), batch.policy()),
            SyncStrategy::Live(_) => return DrawOutcome::NotCached,
        };

        let (candidate, refetched) = match (next, policy) {
            (Some(candidate), _) => (candidate, false),
            (None, ExhaustionPolicy::Signal) => {
                self.stats.exhausted_draws += 1;
                warn!("Cached batch for {} is exhausted, no candidate available", self.agent.namespace);
                return DrawOutcome::Exhausted;
            }
            (None, ExhaustionPolicy::Refetch) => {
                info!("Cached batch for {} is exhausted, refetching", self.agent.namespace);
                let refilled = match self.refill_batch().await {
                    Ok(_) => self.pop_cached(),
                    Err(e) => {
                        warn!("Refetching batch for {} failed: {}", self.agent.namespace, e);
                        None
                    }
                };
                match refilled {
                    Some(candidate) => (candidate, true),
                    None => {
                        self.stats.exhausted_draws += 1;
                        return DrawOutcome::Exhausted;
                    }
                }
            }
        };

        self.stats.draws += 1;
        let remaining = self.cached_remaining().unwrap_or(0);
        match (self.apply(candidate, "cache"), refetched) {
            (Population::Applied, false) => DrawOutcome::Applied { remaining },
            (Population::Applied, true) => DrawOutcome::Refetched { remaining },
            _ => DrawOutcome::Rejected,
        }
    }

    /// Erase the namespace history and restart from a fresh generation-0
    /// agent with the declared defaults.
    pub async fn reset(&mut self) -> Result<()> {
        let namespace = self.agent.namespace.clone();
        self.agent = Agent::new(namespace.clone(), self.initial_params.clone(), self.origin.clone());
        if let SyncStrategy::Cached(batch) = &mut self.strategy {
            batch.clear();
        }

        self.bootstrap(true).await?;
        warn!("History cleared for {}, trial restarted with agent {}", namespace, self.agent.id);
        Ok(())
    }

    // === Environment access ===

    /// Current agent.
    pub fn agent(&self) -> &Agent<E::State> {
        &self.agent
    }

    /// Replace the observable state.
    pub fn set_state(&mut self, state: E::State) {
        self.agent.state = state;
    }

    /// Mutate the observable state in place.
    pub fn state_mut(&mut self) -> &mut E::State {
        &mut self.agent.state
    }

    /// Target the agent is scored against.
    pub fn target(&self) -> &E::State {
        &self.target
    }

    /// Trial status of the current agent.
    pub fn status(&self) -> TrialStatus {
        self.agent.status
    }

    /// Optimizer namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.agent.namespace
    }

    /// Strategy mode.
    pub fn mode(&self) -> SyncMode {
        self.strategy.mode()
    }

    /// Candidates left in the cached batch, `None` for live agents.
    pub fn cached_remaining(&self) -> Option<usize> {
        match &self.strategy {
            SyncStrategy::Cached(batch) => Some(batch.remaining()),
            SyncStrategy::Live(_) => None,
        }
    }

    /// Configuration.
    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    /// Counters.
    pub fn stats(&self) -> &TrialStats {
        &self.stats
    }

    // === Optimizer exchanges ===

    /// Clear history if asked, then prepare the strategy.
    async fn bootstrap(&mut self, clear_history: bool) -> Result<()> {
        let limit = self.config.exchange_timeout;
        let namespace = self.agent.namespace.clone();

        if clear_history {
            bounded(limit, "clear_history", self.client.clear_history(&namespace)).await?;
            debug!("Cleared history for {}", namespace);
        }

        match self.strategy.mode() {
            SyncMode::Cached => {
                self.refill_batch().await?;
            }
            SyncMode::Live if self.config.populate_on_start => {
                self.populate_live().await;
            }
            SyncMode::Live => {}
        }
        Ok(())
    }

    /// Submit the current parameters with `score`. Failures are logged only.
    async fn submit(&mut self, score: f64) -> bool {
        let record = FitnessRecord::new(self.agent.namespace.clone(), self.agent.params.clone(), score);
        let result = bounded(
            self.config.exchange_timeout,
            "submit_score",
            self.client.submit_score(&record),
        )
        .await;

        match result {
            Ok(()) => {
                self.stats.submissions += 1;
                debug!("Submitted {:.4} for {} with {}", score, record.namespace(), record.params());
                true
            }
            Err(e) => {
                self.stats.failed_submissions += 1;
                warn!("Score submission for {} failed: {}", record.namespace(), e);
                false
            }
        }
    }

    /// One live optimization step applied to the current agent.
    async fn populate_live(&mut self) -> Population {
        let SyncStrategy::Live(live) = &self.strategy else {
            return Population::Skipped;
        };
        let request = live.request(&self.agent);

        let result = bounded(
            self.config.exchange_timeout,
            "populate_live",
            self.client.populate_live(&request),
        )
        .await;

        match result {
            Ok(candidate) => self.apply(candidate, "populate_live"),
            Err(e) => {
                self.stats.population_failures += 1;
                warn!(
                    "Live populate for {} failed, keeping {}: {}",
                    self.agent.namespace, self.agent.params, e
                );
                Population::Retained
            }
        }
    }

    /// Prefetch a full batch into the cached strategy.
    async fn refill_batch(&mut self) -> Result<usize> {
        let SyncStrategy::Cached(batch) = &self.strategy else {
            return Ok(0);
        };
        let count = batch.batch_size();
        let names = self.agent.params.name_list();
        let namespace = self.agent.namespace.clone();

        let candidates = bounded(
            self.config.exchange_timeout,
            "prefetch_batch",
            self.client.prefetch_batch(&namespace, &names, count),
        )
        .await?;

        let fetched = candidates.len();
        if fetched < count {
            warn!("Optimizer returned {} of {} requested candidates for {}", fetched, count, namespace);
        }
        if let SyncStrategy::Cached(batch) = &mut self.strategy {
            batch.fill(candidates);
        }
        info!("Cached {} candidates for {}", fetched, namespace);
        Ok(fetched)
    }

    fn pop_cached(&mut self) -> Option<Candidate> {
        match &mut self.strategy {
            SyncStrategy::Cached(batch) => batch.pop(),
            SyncStrategy::Live(_) => None,
        }
    }

    /// Write a candidate, keeping the previous values if it is unusable.
    fn apply(&mut self, candidate: Candidate, source: &str) -> Population {
        let namespace = &self.agent.namespace;
        let report = self.agent.params.overwrite(&candidate);

        if let Some(name) = &report.rejected {
            self.stats.population_failures += 1;
            warn!("Optimizer sent a non-finite value for {} in {} ({}), keeping previous parameters", name, namespace, source);
            return Population::Retained;
        }
        if !report.was_applied() {
            self.stats.population_failures += 1;
            warn!("Optimizer sent no declared parameters for {} ({}), keeping previous parameters", namespace, source);
            return Population::Retained;
        }

        if !report.unknown.is_empty() {
            warn!("Optimizer contract violation for {}: undeclared parameters {:?} ignored", namespace, report.unknown);
        }
        if !report.missing.is_empty() {
            warn!("Optimizer contract violation for {}: missing parameters {:?} keep their value", namespace, report.missing);
        }

        self.stats.populations += 1;
        debug!("Applied {} to agent {} from {}", self.agent.params, self.agent.id, source);
        Population::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evotrial_core::{ColorDistance, Rgb};
    use evotrial_optimizer::{OptimizerError, PopulateRequest};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connectivity,
        Clear,
        Submit(f64, Candidate),
        Populate,
        Prefetch(usize),
    }

    /// Scripted optimizer recording every call.
    #[derive(Default)]
    struct MockClient {
        offline: bool,
        fail_submit: bool,
        calls: Mutex<Vec<Call>>,
        live: Mutex<VecDeque<evotrial_optimizer::Result<Candidate>>>,
        batches: Mutex<VecDeque<Vec<Candidate>>>,
    }

    impl MockClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn submits(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Submit(..))).count()
        }

        fn populates(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Populate)).count()
        }

        fn push_live(&self, candidate: Candidate) {
            self.live.lock().unwrap().push_back(Ok(candidate));
        }

        fn push_batch(&self, batch: Vec<Candidate>) {
            self.batches.lock().unwrap().push_back(batch);
        }
    }

    #[async_trait]
    impl OptimizerClient for MockClient {
        async fn has_connectivity(&self) -> bool {
            self.calls.lock().unwrap().push(Call::Connectivity);
            !self.offline
        }

        async fn clear_history(&self, _namespace: &Namespace) -> evotrial_optimizer::Result<()> {
            self.calls.lock().unwrap().push(Call::Clear);
            Ok(())
        }

        async fn submit_score(&self, record: &FitnessRecord) -> evotrial_optimizer::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Submit(record.score(), record.params().to_candidate()));
            if self.fail_submit {
                return Err(OptimizerError::Unreachable("down".into()));
            }
            Ok(())
        }

        async fn populate_live(&self, _request: &PopulateRequest) -> evotrial_optimizer::Result<Candidate> {
            self.calls.lock().unwrap().push(Call::Populate);
            self.live
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OptimizerError::Unreachable("no scripted candidate".into())))
        }

        async fn prefetch_batch(
            &self,
            _namespace: &Namespace,
            _parameter_names: &[String],
            count: usize,
        ) -> evotrial_optimizer::Result<Vec<Candidate>> {
            self.calls.lock().unwrap().push(Call::Prefetch(count));
            Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn draw_from_cache(&self, _namespace: &Namespace) -> evotrial_optimizer::Result<Option<Candidate>> {
            Ok(None)
        }
    }

    fn rgb(r: f64, g: f64, b: f64) -> Candidate {
        [("red".to_string(), r), ("green".to_string(), g), ("blue".to_string(), b)]
            .into_iter()
            .collect()
    }

    fn color_agent() -> Agent<Rgb> {
        Agent::new(
            Namespace::new("Box").unwrap(),
            ParameterSet::new([("red", 0.2), ("green", 0.2), ("blue", 0.2)]).unwrap(),
            Rgb::new(0.2, 0.2, 0.2),
        )
    }

    async fn start(client: Arc<MockClient>, config: TrialConfig) -> Result<TrialController<ColorDistance>> {
        TrialController::builder(color_agent(), ColorDistance::new(), Rgb::new(1.0, 0.0, 0.0))
            .with_config(config)
            .start(client)
            .await
    }

    fn live_config() -> TrialConfig {
        TrialConfig::default().with_populate_on_start(false)
    }

    #[tokio::test]
    async fn test_start_fails_without_connectivity() {
        let client = Arc::new(MockClient { offline: true, ..Default::default() });
        let result = start(client.clone(), live_config()).await;

        assert!(matches!(result, Err(TrialError::Connectivity(_))));
        assert_eq!(client.calls(), vec![Call::Connectivity]);
    }

    #[tokio::test]
    async fn test_live_start_clears_and_populates() {
        let client = Arc::new(MockClient::default());
        client.push_live(rgb(0.5, 0.5, 0.5));
        let controller = start(client.clone(), TrialConfig::default()).await.unwrap();

        assert_eq!(client.calls(), vec![Call::Connectivity, Call::Clear, Call::Populate]);
        assert_eq!(controller.agent().params.get("red"), Some(0.5));
    }

    #[tokio::test]
    async fn test_submission_precedes_parameter_update() {
        let client = Arc::new(MockClient::default());
        client.push_live(rgb(0.9, 0.1, 0.1));
        let mut controller = start(client.clone(), live_config()).await.unwrap();

        let outcome = controller.tick().await;
        assert!(matches!(outcome, TickOutcome::Continued { population: Population::Applied, .. }));

        let calls = client.calls();
        let submit_at = calls.iter().position(|c| matches!(c, Call::Submit(..))).unwrap();
        let populate_at = calls.iter().position(|c| matches!(c, Call::Populate)).unwrap();
        assert!(submit_at < populate_at);

        // The submitted sample carries the parameters that were scored
        match &calls[submit_at] {
            Call::Submit(_, params) => assert_eq!(params, &rgb(0.2, 0.2, 0.2)),
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(controller.agent().params.get("red"), Some(0.9));
    }

    #[tokio::test]
    async fn test_failed_submission_is_not_fatal() {
        let client = Arc::new(MockClient { fail_submit: true, ..Default::default() });
        client.push_live(rgb(0.4, 0.4, 0.4));
        let mut controller = start(client.clone(), live_config()).await.unwrap();

        let outcome = controller.tick().await;
        assert!(matches!(
            outcome,
            TickOutcome::Continued { submitted: false, population: Population::Applied, .. }
        ));
        assert_eq!(controller.status(), TrialStatus::Active);
        assert_eq!(controller.stats().failed_submissions, 1);
    }

    #[tokio::test]
    async fn test_failed_populate_keeps_parameters() {
        let client = Arc::new(MockClient::default());
        let mut controller = start(client.clone(), live_config()).await.unwrap();
        let before = controller.agent().params.clone();

        let outcome = controller.tick().await;
        assert!(matches!(outcome, TickOutcome::Continued { population: Population::Retained, .. }));
        assert_eq!(controller.agent().params, before);
        assert_eq!(controller.stats().population_failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_candidate_is_rejected() {
        let client = Arc::new(MockClient::default());
        client.push_live(rgb(0.9, f64::NAN, 0.9));
        client.push_live(Candidate::new());
        let mut controller = start(client.clone(), live_config()).await.unwrap();
        let before = controller.agent().params.clone();

        controller.tick().await;
        assert_eq!(controller.agent().params, before);
        controller.tick().await;
        assert_eq!(controller.agent().params, before);
        assert_eq!(controller.stats().population_failures, 2);
    }

    #[tokio::test]
    async fn test_partial_candidate_keeps_missing_values() {
        let client = Arc::new(MockClient::default());
        let mut partial = Candidate::new();
        partial.insert("red".into(), 0.8);
        partial.insert("alpha".into(), 0.3);
        client.push_live(partial);
        let mut controller = start(client.clone(), live_config()).await.unwrap();

        controller.tick().await;
        let params = &controller.agent().params;
        assert_eq!(params.get("red"), Some(0.8));
        assert_eq!(params.get("green"), Some(0.2));
        assert_eq!(params.get("alpha"), None);
    }

    #[tokio::test]
    async fn test_goal_concludes_and_suppresses_ticks() {
        let client = Arc::new(MockClient::default());
        let mut controller = start(client.clone(), live_config()).await.unwrap();
        controller.set_state(Rgb::new(0.95, 0.05, 0.0));

        let outcome = controller.tick().await;
        assert!(matches!(outcome, TickOutcome::Concluded { submitted: true, .. }));
        assert_eq!(controller.status(), TrialStatus::Concluded);

        let calls_after_goal = client.calls().len();
        for _ in 0..5 {
            assert_eq!(controller.tick().await, TickOutcome::Suppressed);
        }
        assert_eq!(client.calls().len(), calls_after_goal);
        assert_eq!(client.populates(), 0);
        assert_eq!(controller.stats().suppressed_ticks, 5);
    }

    #[tokio::test]
    async fn test_failure_spawns_single_successor_after_final_submit() {
        let client = Arc::new(MockClient::default());
        client.push_live(rgb(0.6, 0.6, 0.6));
        let mut controller = start(client.clone(), live_config()).await.unwrap();
        let first = controller.agent().id;
        controller.set_state(Rgb::new(0.5, 0.5, 0.5));

        let succession = controller.on_failure().await.unwrap();

        assert_eq!(succession.retired, first);
        assert_eq!(succession.successor, controller.agent().id);
        assert_ne!(succession.successor, first);
        assert_eq!(succession.generation, 1);
        assert_eq!(succession.population, Population::Applied);
        assert_eq!(succession.params.get("red"), Some(0.6));
        assert_eq!(client.submits(), 1);
        assert_eq!(controller.stats().successors, 1);

        // Successor restarts from the origin
        assert_eq!(controller.agent().state, Rgb::new(0.2, 0.2, 0.2));

        let calls = client.calls();
        let submit_at = calls.iter().position(|c| matches!(c, Call::Submit(..))).unwrap();
        let populate_at = calls.iter().rposition(|c| matches!(c, Call::Populate)).unwrap();
        assert!(submit_at < populate_at);
    }

    #[tokio::test]
    async fn test_success_submits_ceiling_once() {
        let client = Arc::new(MockClient::default());
        let mut controller = start(client.clone(), live_config().with_success_score(100.0))
            .await
            .unwrap();

        let conclusion = controller.on_success().await.unwrap();
        assert_eq!(conclusion, Conclusion { score: 100.0, submitted: true });
        assert!(controller.on_success().await.is_none());
        assert!(controller.on_failure().await.is_none());
        assert_eq!(client.submits(), 1);
        assert_eq!(controller.status(), TrialStatus::Concluded);
    }

    #[tokio::test]
    async fn test_cached_ticks_never_populate() {
        let client = Arc::new(MockClient::default());
        client.push_batch(vec![rgb(0.1, 0.1, 0.1)]);
        let config = TrialConfig::default().with_mode(SyncMode::Cached).with_batch_size(1);
        let mut controller = start(client.clone(), config).await.unwrap();

        // Cached trials keep their history and prefetch once
        assert_eq!(client.calls(), vec![Call::Connectivity, Call::Prefetch(1)]);

        let outcome = controller.tick().await;
        assert!(matches!(outcome, TickOutcome::Continued { population: Population::Skipped, .. }));
        assert_eq!(client.populates(), 0);
        assert_eq!(controller.cached_remaining(), Some(1));
    }

    #[tokio::test]
    async fn test_draw_on_live_is_noop() {
        let client = Arc::new(MockClient::default());
        let mut controller = start(client, live_config()).await.unwrap();
        assert_eq!(controller.trigger_draw().await, DrawOutcome::NotCached);
    }

    #[tokio::test]
    async fn test_refetch_policy_refills_batch() {
        let client = Arc::new(MockClient::default());
        client.push_batch(vec![rgb(0.1, 0.1, 0.1)]);
        client.push_batch(vec![rgb(0.7, 0.7, 0.7), rgb(0.8, 0.8, 0.8)]);
        let config = TrialConfig::default()
            .with_mode(SyncMode::Cached)
            .with_batch_size(2)
            .with_exhaustion(ExhaustionPolicy::Refetch);
        let mut controller = start(client.clone(), config).await.unwrap();

        assert_eq!(controller.trigger_draw().await, DrawOutcome::Applied { remaining: 0 });
        assert_eq!(controller.trigger_draw().await, DrawOutcome::Refetched { remaining: 1 });
        assert_eq!(controller.agent().params.get("red"), Some(0.7));

        assert_eq!(controller.trigger_draw().await, DrawOutcome::Applied { remaining: 0 });
        // Second refetch comes back empty
        assert_eq!(controller.trigger_draw().await, DrawOutcome::Exhausted);
        assert_eq!(controller.agent().params.get("red"), Some(0.8));
    }

    #[tokio::test]
    async fn test_reset_clears_history_and_restarts() {
        let client = Arc::new(MockClient::default());
        let mut controller = start(client.clone(), live_config()).await.unwrap();
        controller.on_success().await.unwrap();

        controller.reset().await.unwrap();
        assert_eq!(controller.status(), TrialStatus::Active);
        assert_eq!(controller.agent().generation, 0);
        assert_eq!(controller.agent().params.get("red"), Some(0.2));
        assert_eq!(client.calls().iter().filter(|c| matches!(c, Call::Clear)).count(), 2);
    }
}
