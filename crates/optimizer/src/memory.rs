//! In-process reference optimizer.
//!
//! Keeps per-namespace fitness history in memory and breeds candidates
//! from the best samples: uniform crossover between the top-ranked
//! parents, then per-value mutation. Used by the demos and whenever no
//! remote service is configured.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use evotrial_core::{Candidate, FitnessRecord, Namespace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{OptimizerClient, OptimizerError, PopulateRequest, Result};

/// Inclusive value range used for seeding, mutation scale and clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl Bounds {
    /// Create bounds; swapped arguments are reordered.
    pub fn new(a: f64, b: f64) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    fn span(&self) -> f64 {
        self.max - self.min
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        if self.span() <= 0.0 {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Tuning for the reference optimizer.
#[derive(Debug, Clone)]
pub struct MemoryOptimizerConfig {
    /// Samples kept per namespace; the worst are evicted first
    pub max_history: usize,

    /// Mutation step as a fraction of the parameter's span
    pub mutation_scale: f64,

    /// Parent pool size used when pre-generating batches
    pub batch_generation_count: u32,

    /// Mutation rate used when pre-generating batches
    pub batch_mutation_rate: f64,
}

impl Default for MemoryOptimizerConfig {
    fn default() -> Self {
        Self {
            max_history: 256,
            mutation_scale: 0.1,
            batch_generation_count: 2,
            batch_mutation_rate: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
struct Sample {
    candidate: Candidate,
    score: f64,
}

#[derive(Debug, Default)]
struct NamespaceState {
    /// Sorted best-first
    history: Vec<Sample>,
    /// Latest prefetched batch
    cache: VecDeque<Candidate>,
}

struct Inner {
    namespaces: HashMap<Namespace, NamespaceState>,
    rng: StdRng,
}

/// In-memory optimizer service.
pub struct InMemoryOptimizer {
    inner: Mutex<Inner>,
    bounds: HashMap<String, Bounds>,
    config: MemoryOptimizerConfig,
    online: AtomicBool,
}

impl InMemoryOptimizer {
    /// Create an optimizer seeded from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Create a deterministic optimizer.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(Inner { namespaces: HashMap::new(), rng }),
            bounds: HashMap::new(),
            config: MemoryOptimizerConfig::default(),
            online: AtomicBool::new(true),
        }
    }

    /// Set the value range of a parameter (default `[0, 1]`).
    pub fn with_bounds(mut self, name: impl Into<String>, bounds: Bounds) -> Self {
        self.bounds.insert(name.into(), bounds);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: MemoryOptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Simulate the service going up or down.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of samples recorded for a namespace.
    pub async fn history_len(&self, namespace: &Namespace) -> usize {
        self.inner
            .lock()
            .await
            .namespaces
            .get(namespace)
            .map_or(0, |ns| ns.history.len())
    }

    /// Best score recorded for a namespace.
    pub async fn best_score(&self, namespace: &Namespace) -> Option<f64> {
        self.inner
            .lock()
            .await
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.history.first())
            .map(|s| s.score)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OptimizerError::Unreachable("in-memory optimizer is offline".to_string()))
        }
    }

    fn bounds_of(&self, name: &str) -> Bounds {
        self.bounds.get(name).copied().unwrap_or_default()
    }

    /// Breed one candidate from the best `generation_count` samples.
    fn breed(
        &self,
        inner: &mut Inner,
        namespace: &Namespace,
        names: &[String],
        generation_count: u32,
        mutation_rate: f64,
        replay_best: bool,
    ) -> Candidate {
        let Inner { namespaces, rng } = inner;
        let history = namespaces
            .get(namespace)
            .map(|ns| ns.history.as_slice())
            .unwrap_or(&[]);

        if replay_best {
            if let Some(best) = history.first() {
                return names
                    .iter()
                    .map(|n| {
                        let value = best
                            .candidate
                            .get(n)
                            .copied()
                            .unwrap_or_else(|| self.bounds_of(n).sample(rng));
                        (n.clone(), value)
                    })
                    .collect();
            }
        }

        let pool = (generation_count.max(1) as usize).min(history.len());
        let parents = &history[..pool];
        let mutation_rate = mutation_rate.clamp(0.0, 1.0);

        names
            .iter()
            .map(|name| {
                let bounds = self.bounds_of(name);
                let inherited = if parents.is_empty() {
                    None
                } else {
                    let parent = &parents[rng.random_range(0..parents.len())];
                    parent.candidate.get(name).copied()
                };

                let value = match inherited {
                    Some(v) if rng.random_bool(mutation_rate) => {
                        let step = bounds.span() * self.config.mutation_scale;
                        bounds.clamp(v + rng.random_range(-1.0f64..=1.0) * step)
                    }
                    Some(v) => v,
                    None => bounds.sample(rng),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

impl Default for InMemoryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OptimizerClient for InMemoryOptimizer {
    async fn has_connectivity(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn clear_history(&self, namespace: &Namespace) -> Result<()> {
        self.ensure_online()?;
        self.inner.lock().await.namespaces.remove(namespace);
        info!("Cleared optimizer history for {}", namespace);
        Ok(())
    }

    async fn submit_score(&self, record: &FitnessRecord) -> Result<()> {
        self.ensure_online()?;
        if !record.score().is_finite() {
            return Err(OptimizerError::InvalidRequest(format!(
                "non-finite score for {}",
                record.namespace()
            )));
        }

        let mut inner = self.inner.lock().await;
        let state = inner.namespaces.entry(record.namespace().clone()).or_default();
        let sample = Sample {
            candidate: record.params().to_candidate(),
            score: record.score(),
        };

        // Insert after equal scores so older samples win ties
        let at = state.history.partition_point(|s| s.score >= sample.score);
        state.history.insert(at, sample);
        state.history.truncate(self.config.max_history);

        debug!(
            "Recorded score {:.4} for {} ({} samples)",
            record.score(),
            record.namespace(),
            state.history.len()
        );
        Ok(())
    }

    async fn populate_live(&self, request: &PopulateRequest) -> Result<Candidate> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let candidate = self.breed(
            &mut inner,
            &request.namespace,
            &request.parameter_names,
            request.generation_count,
            request.mutation_rate,
            request.service_flag,
        );
        debug!("Populated {} with {:?}", request.namespace, candidate);
        Ok(candidate)
    }

    async fn prefetch_batch(
        &self,
        namespace: &Namespace,
        parameter_names: &[String],
        count: usize,
    ) -> Result<Vec<Candidate>> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;

        let batch: Vec<Candidate> = (0..count)
            .map(|_| {
                self.breed(
                    &mut inner,
                    namespace,
                    parameter_names,
                    self.config.batch_generation_count,
                    self.config.batch_mutation_rate,
                    false,
                )
            })
            .collect();

        // The service cache only ever holds the latest batch
        inner.namespaces.entry(namespace.clone()).or_default().cache =
            batch.iter().cloned().collect();

        info!("Prefetched {} candidates for {}", batch.len(), namespace);
        Ok(batch)
    }

    async fn draw_from_cache(&self, namespace: &Namespace) -> Result<Option<Candidate>> {
        self.ensure_online()?;
        Ok(self
            .inner
            .lock()
            .await
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.cache.pop_front()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evotrial_core::ParameterSet;

    fn ns() -> Namespace {
        Namespace::new("Box").unwrap()
    }

    fn names() -> Vec<String> {
        vec!["red".to_string(), "green".to_string(), "blue".to_string()]
    }

    fn request(mutation_rate: f64) -> PopulateRequest {
        PopulateRequest {
            namespace: ns(),
            parameter_names: names(),
            generation_count: 2,
            mutation_rate,
            service_flag: false,
        }
    }

    async fn submit(opt: &InMemoryOptimizer, values: [f64; 3], score: f64) {
        let params = ParameterSet::new([("red", values[0]), ("green", values[1]), ("blue", values[2])]).unwrap();
        opt.submit_score(&FitnessRecord::new(ns(), params, score)).await.unwrap();
    }

    #[tokio::test]
    async fn test_populate_without_history_samples_within_bounds() {
        let opt = InMemoryOptimizer::seeded(7).with_bounds("red", Bounds::new(2.0, 3.0));
        let candidate = opt.populate_live(&request(0.25)).await.unwrap();

        assert_eq!(candidate.len(), 3);
        let red = candidate["red"];
        assert!((2.0..=3.0).contains(&red));
        assert!((0.0..=1.0).contains(&candidate["green"]));
    }

    #[tokio::test]
    async fn test_populate_without_mutation_inherits_from_best_parents() {
        let opt = InMemoryOptimizer::seeded(1);
        submit(&opt, [0.1, 0.1, 0.1], -0.9).await;
        submit(&opt, [0.8, 0.8, 0.8], -0.1).await;
        submit(&opt, [0.7, 0.7, 0.7], -0.2).await;

        for _ in 0..20 {
            let c = opt.populate_live(&request(0.0)).await.unwrap();
            for value in c.values() {
                assert!(*value == 0.8 || *value == 0.7, "unexpected gene {value}");
            }
        }
    }

    #[tokio::test]
    async fn test_service_flag_replays_best() {
        let opt = InMemoryOptimizer::seeded(3);
        submit(&opt, [0.3, 0.4, 0.5], -0.05).await;
        submit(&opt, [0.9, 0.9, 0.9], -0.7).await;

        let mut req = request(1.0);
        req.service_flag = true;
        let c = opt.populate_live(&req).await.unwrap();
        assert_eq!(c["red"], 0.3);
        assert_eq!(c["blue"], 0.5);
    }

    #[tokio::test]
    async fn test_history_is_ranked_and_capped() {
        let opt = InMemoryOptimizer::seeded(0).with_config(MemoryOptimizerConfig {
            max_history: 2,
            ..Default::default()
        });
        submit(&opt, [0.0; 3], -3.0).await;
        submit(&opt, [0.0; 3], -1.0).await;
        submit(&opt, [0.0; 3], -2.0).await;

        assert_eq!(opt.history_len(&ns()).await, 2);
        assert_eq!(opt.best_score(&ns()).await, Some(-1.0));
    }

    #[tokio::test]
    async fn test_clear_history_is_idempotent() {
        let opt = InMemoryOptimizer::seeded(0);
        submit(&opt, [0.5; 3], -0.2).await;

        opt.clear_history(&ns()).await.unwrap();
        assert_eq!(opt.history_len(&ns()).await, 0);
        opt.clear_history(&ns()).await.unwrap();
        assert_eq!(opt.history_len(&ns()).await, 0);
        assert_eq!(opt.best_score(&ns()).await, None);
    }

    #[tokio::test]
    async fn test_prefetch_fills_service_cache() {
        let opt = InMemoryOptimizer::seeded(11);
        let batch = opt.prefetch_batch(&ns(), &names(), 3).await.unwrap();
        assert_eq!(batch.len(), 3);

        for expected in &batch {
            let drawn = opt.draw_from_cache(&ns()).await.unwrap();
            assert_eq!(drawn.as_ref(), Some(expected));
        }
        assert_eq!(opt.draw_from_cache(&ns()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_repeated_prefetch_keeps_only_latest_batch() {
        let opt = InMemoryOptimizer::seeded(5);
        let mut latest = Vec::new();
        for _ in 0..100 {
            latest = opt.prefetch_batch(&ns(), &names(), 40).await.unwrap();
        }

        let mut drawn = Vec::new();
        while let Some(candidate) = opt.draw_from_cache(&ns()).await.unwrap() {
            drawn.push(candidate);
        }
        assert_eq!(drawn.len(), 40);
        assert_eq!(drawn, latest);
    }

    #[tokio::test]
    async fn test_offline_rejects_calls() {
        let opt = InMemoryOptimizer::seeded(0);
        opt.set_online(false);

        assert!(!opt.has_connectivity().await);
        assert!(matches!(
            opt.populate_live(&request(0.1)).await,
            Err(OptimizerError::Unreachable(_))
        ));
        assert!(opt.clear_history(&ns()).await.is_err());
    }

    #[tokio::test]
    async fn test_non_finite_score_rejected() {
        let opt = InMemoryOptimizer::seeded(0);
        let params = ParameterSet::new([("red", 0.1)]).unwrap();
        let result = opt.submit_score(&FitnessRecord::new(ns(), params, f64::NAN)).await;
        assert!(matches!(result, Err(OptimizerError::InvalidRequest(_))));
        assert_eq!(opt.history_len(&ns()).await, 0);
    }
}
