//! Genetic algorithm over a bounded design space.
//!
//! Generation 0 is a uniform random population. Each following generation
//! keeps the top `elitism` individuals with their evaluations, breeds the
//! rest by selection, crossover, Gaussian mutation and bounds enforcement,
//! and evaluates every individual that has no evaluation yet.
//!
//! Operators are free functions generic over [`Rng`] so they can be tested
//! with a seeded generator and without any external tool.

use crate::config::{BoundsPolicy, CrossoverKind, OptimizerConfig, SelectionKind};
use crate::design::{DesignSpace, DesignVector};
use crate::fitness::{Evaluation, FitnessEvaluator};
use crate::obs;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Population member. Offspring start without an evaluation.
#[derive(Debug, Clone)]
pub struct Individual {
    pub vector: DesignVector,
    pub evaluation: Option<Evaluation>,
}

impl Individual {
    pub fn new(vector: DesignVector) -> Self {
        Self {
            vector,
            evaluation: None,
        }
    }

    /// Score used for ranking; unevaluated individuals rank last.
    pub fn score(&self) -> f64 {
        self.evaluation
            .as_ref()
            .map(|e| e.score())
            .unwrap_or(f64::NEG_INFINITY)
    }
}

/// Statistics of one completed generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    /// Best evaluation id seen so far (across all generations).
    pub best_evaluation_id: Option<String>,
    pub best_so_far: f64,
    pub evaluated: usize,
    pub failed: usize,
    pub cache_hits: usize,
}

/// Outcome of a whole optimization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationResult {
    pub best: Option<Evaluation>,
    pub generations_completed: usize,
    pub total_evaluations: usize,
    pub failed_evaluations: usize,
    pub cache_hits: usize,
    pub stopped_early: bool,
    pub history: Vec<GenerationSummary>,
}

/// Receives progress after every generation and once at the end.
#[async_trait]
pub trait ProgressObserver: Send {
    /// `evaluations` holds the evaluations produced in this generation, in
    /// population order.
    async fn on_generation(&mut self, summary: &GenerationSummary, evaluations: &[Evaluation]);

    async fn on_finish(&mut self, result: &OptimizationResult);
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl ProgressObserver for NoopObserver {
    async fn on_generation(&mut self, _summary: &GenerationSummary, _evaluations: &[Evaluation]) {}
    async fn on_finish(&mut self, _result: &OptimizationResult) {}
}

/// Tournament selection: best of `size` uniformly drawn individuals.
pub fn tournament_select<'a, R: Rng>(
    population: &'a [Individual],
    size: usize,
    rng: &mut R,
) -> &'a Individual {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..size.max(1) {
        let candidate = &population[rng.gen_range(0..population.len())];
        if candidate.score() > best.score() {
            best = candidate;
        }
    }
    best
}

/// Linear ranking selection: the worst individual has weight 1, the best
/// has weight `population.len()`.
pub fn rank_select<'a, R: Rng>(population: &'a [Individual], rng: &mut R) -> &'a Individual {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| population[a].score().total_cmp(&population[b].score()));

    let n = population.len();
    let total = n * (n + 1) / 2;
    let mut pick = rng.gen_range(0..total);
    for (rank, &index) in order.iter().enumerate() {
        let weight = rank + 1;
        if pick < weight {
            return &population[index];
        }
        pick -= weight;
    }
    &population[order[n - 1]]
}

/// Recombine two parents into two children.
pub fn crossover<R: Rng>(
    kind: CrossoverKind,
    a: &[f64],
    b: &[f64],
    blend_alpha: f64,
    rng: &mut R,
) -> (Vec<f64>, Vec<f64>) {
    let n = a.len().min(b.len());
    match kind {
        CrossoverKind::SinglePoint => {
            if n < 2 {
                return (b[..n].to_vec(), a[..n].to_vec());
            }
            let cut = rng.gen_range(1..n);
            let mut c1 = a[..cut].to_vec();
            c1.extend_from_slice(&b[cut..n]);
            let mut c2 = b[..cut].to_vec();
            c2.extend_from_slice(&a[cut..n]);
            (c1, c2)
        }
        CrossoverKind::Uniform => {
            let mut c1 = Vec::with_capacity(n);
            let mut c2 = Vec::with_capacity(n);
            for i in 0..n {
                if rng.gen_bool(0.5) {
                    c1.push(a[i]);
                    c2.push(b[i]);
                } else {
                    c1.push(b[i]);
                    c2.push(a[i]);
                }
            }
            (c1, c2)
        }
        CrossoverKind::Blend => {
            let mut c1 = Vec::with_capacity(n);
            let mut c2 = Vec::with_capacity(n);
            for i in 0..n {
                let lo = a[i].min(b[i]);
                let hi = a[i].max(b[i]);
                let spread = (hi - lo) * blend_alpha;
                let (low, high) = (lo - spread, hi + spread);
                if high > low {
                    c1.push(rng.gen_range(low..=high));
                    c2.push(rng.gen_range(low..=high));
                } else {
                    c1.push(lo);
                    c2.push(lo);
                }
            }
            (c1, c2)
        }
    }
}

/// Add Gaussian noise to each gene with probability `rate`. The standard
/// deviation is `sigma * (upper - lower)` of that gene's variable.
pub fn mutate<R: Rng>(values: &mut [f64], space: &DesignSpace, rate: f64, sigma: f64, rng: &mut R) {
    for (value, variable) in values.iter_mut().zip(space.variables()) {
        if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
            continue;
        }
        let std_dev = sigma * variable.range();
        if std_dev <= 0.0 {
            continue;
        }
        if let Ok(noise) = Normal::new(0.0, std_dev) {
            *value += noise.sample(rng);
        }
    }
}

/// Bring every gene back within its bounds.
pub fn enforce_bounds<R: Rng>(values: &mut [f64], space: &DesignSpace, policy: BoundsPolicy, rng: &mut R) {
    for (value, variable) in values.iter_mut().zip(space.variables()) {
        if variable.contains(*value) {
            continue;
        }
        *value = match policy {
            BoundsPolicy::Clamp => variable.clamp(*value),
            BoundsPolicy::Resample => variable.sample(rng),
        };
    }
}

/// Generational genetic optimizer.
pub struct GeneticOptimizer {
    space: DesignSpace,
    config: OptimizerConfig,
    max_parallel: usize,
    evaluator: FitnessEvaluator,
}

impl GeneticOptimizer {
    pub fn new(
        space: DesignSpace,
        config: OptimizerConfig,
        max_parallel: usize,
        evaluator: FitnessEvaluator,
    ) -> Self {
        Self {
            space,
            config,
            max_parallel: max_parallel.max(1),
            evaluator,
        }
    }

    /// Override the configured seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.config.seed = seed;
        }
        self
    }

    pub fn space(&self) -> &DesignSpace {
        &self.space
    }

    /// Run every generation (or until stalled) and return the best record.
    pub async fn run<O: ProgressObserver>(&self, observer: &mut O) -> OptimizationResult {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut state = RunState::default();

        let mut population: Vec<Individual> = (0..self.config.population_size)
            .map(|_| Individual::new(self.space.sample(&mut rng)))
            .collect();

        let mut generation = 0;
        loop {
            let previous_best = state.best_score();
            let evaluations = self.evaluate_pending(generation, &mut population, &mut state).await;
            let summary = state.summarize(generation, &population, &evaluations);
            obs::emit_generation_completed(
                generation,
                summary.best_fitness,
                summary.mean_fitness,
                summary.evaluated,
                summary.failed,
            );
            observer.on_generation(&summary, &evaluations).await;
            state.history.push(summary);
            state.generations_completed = generation;

            if generation > 0 && self.stalled(previous_best, &mut state) {
                info!(generation, "Best fitness stalled, stopping early");
                state.stopped_early = true;
                break;
            }
            if generation >= self.config.generations {
                break;
            }

            generation += 1;
            population = self.next_generation(&population, &mut rng);
        }

        let result = state.finish();
        observer.on_finish(&result).await;
        result
    }

    fn stalled(&self, previous_best: f64, state: &mut RunState) -> bool {
        let Some(limit) = self.config.stall_generations else {
            return false;
        };
        let improvement = state.best_score() - previous_best;
        if improvement.is_finite() && improvement > self.config.stall_tolerance {
            state.stall_count = 0;
        } else {
            state.stall_count += 1;
        }
        limit > 0 && state.stall_count >= limit
    }

    /// Elites plus bred offspring, `population_size` in total.
    fn next_generation<R: Rng>(&self, population: &[Individual], rng: &mut R) -> Vec<Individual> {
        let cfg = &self.config;
        let mut ranked: Vec<&Individual> = population.iter().collect();
        ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));

        let mut next: Vec<Individual> = ranked
            .iter()
            .take(cfg.elitism.min(cfg.population_size))
            .map(|ind| (*ind).clone())
            .collect();

        while next.len() < cfg.population_size {
            let p1 = self.select(population, rng).vector.to_values();
            let p2 = self.select(population, rng).vector.to_values();
            let (mut c1, mut c2) = if rng.gen_bool(cfg.crossover_rate.clamp(0.0, 1.0)) {
                crossover(cfg.crossover, &p1, &p2, cfg.blend_alpha, rng)
            } else {
                (p1, p2)
            };
            for child in [&mut c1, &mut c2] {
                mutate(child, &self.space, cfg.mutation_rate, cfg.mutation_sigma, rng);
                enforce_bounds(child, &self.space, cfg.bounds_policy, rng);
            }
            next.push(Individual::new(self.space.vector(c1)));
            if next.len() < cfg.population_size {
                next.push(Individual::new(self.space.vector(c2)));
            }
        }
        next
    }

    fn select<'a, R: Rng>(&self, population: &'a [Individual], rng: &mut R) -> &'a Individual {
        match self.config.selection {
            SelectionKind::Tournament => {
                tournament_select(population, self.config.tournament_size, rng)
            }
            SelectionKind::Rank => rank_select(population, rng),
        }
    }

    /// Evaluate individuals without an evaluation, in population order.
    async fn evaluate_pending(
        &self,
        generation: usize,
        population: &mut [Individual],
        state: &mut RunState,
    ) -> Vec<Evaluation> {
        let cache_enabled = self.config.cache_evaluations;
        let mut jobs: Vec<(usize, DesignVector)> = Vec::new();
        // Slots answered by another slot's evaluation in this generation.
        let mut duplicates: Vec<(usize, usize)> = Vec::new();
        let mut scheduled: HashMap<String, usize> = HashMap::new();

        for (index, individual) in population.iter_mut().enumerate() {
            if individual.evaluation.is_some() {
                continue;
            }
            if cache_enabled {
                let digest = individual.vector.digest();
                if let Some(hit) = state.cache.get(&digest) {
                    let reused = hit.reuse(generation, index, individual.vector.clone());
                    obs::emit_evaluation_cached(&reused.id, &digest);
                    state.cache_hits += 1;
                    individual.evaluation = Some(reused);
                    continue;
                }
                if let Some(&first) = scheduled.get(&digest) {
                    duplicates.push((index, first));
                    continue;
                }
                scheduled.insert(digest, index);
            }
            jobs.push((index, individual.vector.clone()));
        }

        debug!(generation, pending = jobs.len(), "Evaluating generation");
        let evaluator = &self.evaluator;
        let results: Vec<(usize, Evaluation)> = stream::iter(jobs)
            .map(move |(index, vector)| async move {
                (index, evaluator.evaluate(generation, index, vector).await)
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        for (index, evaluation) in results {
            state.record(&evaluation, cache_enabled);
            population[index].evaluation = Some(evaluation);
        }
        for (index, first) in duplicates {
            if let Some(source) = population[first].evaluation.clone() {
                let reused = source.reuse(generation, index, population[index].vector.clone());
                obs::emit_evaluation_cached(&reused.id, &population[index].vector.digest());
                state.cache_hits += 1;
                population[index].evaluation = Some(reused);
            }
        }

        population
            .iter()
            .filter_map(|ind| ind.evaluation.as_ref())
            .filter(|e| e.generation == generation)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct RunState {
    best: Option<Evaluation>,
    cache: HashMap<String, Evaluation>,
    history: Vec<GenerationSummary>,
    generations_completed: usize,
    total_evaluations: usize,
    failed_evaluations: usize,
    cache_hits: usize,
    stall_count: usize,
    stopped_early: bool,
}

impl RunState {
    fn best_score(&self) -> f64 {
        self.best
            .as_ref()
            .map(|e| e.score())
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Count a fresh evaluation and replace the best record only on strict
    /// improvement.
    fn record(&mut self, evaluation: &Evaluation, cache_enabled: bool) {
        self.total_evaluations += 1;
        if !evaluation.outcome.is_success() {
            self.failed_evaluations += 1;
        }
        if self.best.is_none() || evaluation.score() > self.best_score() {
            obs::emit_best_improved(&evaluation.id, evaluation.score());
            self.best = Some(evaluation.clone());
        }
        if cache_enabled {
            self.cache
                .insert(evaluation.vector.digest(), evaluation.clone());
        }
    }

    fn summarize(
        &self,
        generation: usize,
        population: &[Individual],
        evaluations: &[Evaluation],
    ) -> GenerationSummary {
        let scores: Vec<f64> = population
            .iter()
            .filter_map(|ind| ind.evaluation.as_ref().map(|e| e.score()))
            .collect();
        let best_fitness = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_fitness = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        GenerationSummary {
            generation,
            best_fitness,
            mean_fitness,
            best_evaluation_id: self.best.as_ref().map(|e| e.id.clone()),
            best_so_far: self.best_score(),
            evaluated: evaluations.iter().filter(|e| !e.cached).count(),
            failed: evaluations
                .iter()
                .filter(|e| !e.cached && !e.outcome.is_success())
                .count(),
            cache_hits: evaluations.iter().filter(|e| e.cached).count(),
        }
    }

    fn finish(self) -> OptimizationResult {
        OptimizationResult {
            best: self.best,
            generations_completed: self.generations_completed,
            total_evaluations: self.total_evaluations,
            failed_evaluations: self.failed_evaluations,
            cache_hits: self.cache_hits,
            stopped_early: self.stopped_early,
            history: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::DesignVariable;
    use crate::fitness::{Fitness, Outcome};
    use crate::error::FailureKind;

    fn space() -> DesignSpace {
        DesignSpace::new(vec![
            DesignVariable::new("length", 0.5, 2.0, None),
            DesignVariable::new("radius", 0.05, 0.2, None),
            DesignVariable::new("taper", 0.0, 1.0, None),
        ])
        .unwrap()
    }

    fn evaluated(space: &DesignSpace, values: Vec<f64>, score: f64) -> Individual {
        let vector = space.vector(values);
        Individual {
            evaluation: Some(Evaluation {
                id: "g000-i000-00000000".into(),
                generation: 0,
                index: 0,
                vector: vector.clone(),
                outcome: Outcome::Failed {
                    kind: FailureKind::Solver,
                    reason: "test".into(),
                },
                fitness: Fitness {
                    score,
                    components: vec![score],
                },
                elapsed_ms: 0,
                cached: false,
            }),
            vector,
        }
    }

    #[test]
    fn test_tournament_prefers_better() {
        let s = space();
        let population = vec![
            evaluated(&s, vec![1.0, 0.1, 0.5], 1.0),
            evaluated(&s, vec![1.5, 0.1, 0.5], 10.0),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let mut wins = 0;
        for _ in 0..200 {
            if tournament_select(&population, 2, &mut rng).score() == 10.0 {
                wins += 1;
            }
        }
        assert!(wins > 100);
    }

    #[test]
    fn test_rank_select_returns_member() {
        let s = space();
        let population = vec![
            evaluated(&s, vec![1.0, 0.1, 0.5], -1e6),
            evaluated(&s, vec![1.5, 0.1, 0.5], 3.0),
            evaluated(&s, vec![1.2, 0.1, 0.5], 2.0),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let mut best_picks = 0;
        for _ in 0..600 {
            let picked = rank_select(&population, &mut rng);
            if picked.score() == 3.0 {
                best_picks += 1;
            }
        }
        // Expected share is 3/6.
        assert!(best_picks > 200);
    }

    #[test]
    fn test_single_point_crossover_mixes_parents() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = [1.0, 1.0, 1.0, 1.0];
        let b = [2.0, 2.0, 2.0, 2.0];
        let (c1, c2) = crossover(CrossoverKind::SinglePoint, &a, &b, 0.5, &mut rng);
        assert_eq!(c1.len(), 4);
        assert_eq!(c1[0], 1.0);
        assert_eq!(c1[3], 2.0);
        assert_eq!(c2[0], 2.0);
        assert_eq!(c2[3], 1.0);
    }

    #[test]
    fn test_operators_keep_bounds() {
        let s = space();
        let mut rng = StdRng::seed_from_u64(42);
        for kind in [CrossoverKind::SinglePoint, CrossoverKind::Uniform, CrossoverKind::Blend] {
            for policy in [BoundsPolicy::Clamp, BoundsPolicy::Resample] {
                for _ in 0..200 {
                    let a = s.sample(&mut rng).to_values();
                    let b = s.sample(&mut rng).to_values();
                    let (mut c1, mut c2) = crossover(kind, &a, &b, 0.5, &mut rng);
                    for child in [&mut c1, &mut c2] {
                        mutate(child, &s, 1.0, 0.5, &mut rng);
                        enforce_bounds(child, &s, policy, &mut rng);
                        for (value, variable) in child.iter().zip(s.variables()) {
                            assert!(variable.contains(*value), "{} out of bounds", value);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_mutation_rate_zero_is_identity() {
        let s = space();
        let mut rng = StdRng::seed_from_u64(5);
        let mut values = vec![1.0, 0.1, 0.5];
        mutate(&mut values, &s, 0.0, 0.5, &mut rng);
        assert_eq!(values, vec![1.0, 0.1, 0.5]);
    }
}
