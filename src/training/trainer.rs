//! Sharded maximum-likelihood trainer.
//!
//! ```text
//!             examples ──► partition by world ──► shard 0 │ shard 1 │ … │ shard n-1
//!                                                   (each: Llm replica + cached indices)
//!
//!   L-BFGS ──w──► broadcast w to every replica
//!     ▲                │
//!     │           par_iter over shards: private (Σ log p, ∂) per shard
//!     │                │ join
//!     └── -(obj, ∇) ◄──┴── sum on caller thread, subtract λ/2‖w‖² and λw
//! ```
//!
//! Active indices are computed once per example before the optimizer starts.
//! After that, workers only read their own shard; the canonical weight vector
//! lives in the optimizer and is copied into replicas between evaluations.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, error, info};

use super::lbfgs::{self, IterationReport, LbfgsConfig, Objective, Termination};
use crate::config::TrainingConfig;
use crate::error::TrainingError;
use crate::features::{FeatureKinds, FeatureSet, LeafCache};
use crate::model::{Llm, LlmX};
use crate::types::Outcome;
use crate::world::World;

/// Objective and norms after one accepted optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationStats {
    pub iteration: usize,
    /// Regularized log-likelihood
    pub objective: f64,
    pub gradient_norm: f64,
    pub weight_norm: f64,
    pub step: f64,
}

impl From<&IterationReport> for IterationStats {
    fn from(report: &IterationReport) -> Self {
        Self {
            iteration: report.iteration,
            objective: -report.value,
            gradient_norm: report.gradient_norm,
            weight_norm: report.x_norm,
            step: report.step,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub history: Vec<IterationStats>,
    pub termination: Termination,
    /// Final regularized log-likelihood
    pub objective: f64,
    pub examples: usize,
    pub features: usize,
    pub shards: usize,
}

/// One example reduced to what the objective needs.
#[derive(Debug, Clone, PartialEq)]
struct CachedExample {
    /// Position of the true label in the outcome domain
    truth: usize,
    /// Active feature indices, one list per outcome in the domain
    indices: Vec<Vec<usize>>,
}

/// A model replica and the examples it owns.
#[derive(Debug)]
struct Shard {
    llm: Llm,
    examples: Vec<CachedExample>,
}

impl Shard {
    /// Precompute active indices for `members`, in list order.
    ///
    /// Consecutive examples over the same phrase reuse its syntax leaves.
    fn build(llm: Llm, examples: &[(Outcome, LlmX)], members: &[usize], truths: &[usize]) -> Self {
        let mut cache = LeafCache::new();
        let mut previous: Option<&LlmX> = None;
        let mut cached = Vec::with_capacity(members.len());

        for &i in members {
            let x = &examples[i].1;
            let same_phrase = previous
                .is_some_and(|p| Arc::ptr_eq(&p.phrase, &x.phrase) || p.phrase == x.phrase);
            let first_kinds = if same_phrase {
                FeatureKinds::GROUNDING
            } else {
                FeatureKinds::ALL
            };
            cached.push(CachedExample {
                truth: truths[i],
                indices: llm.domain_indices_with(x, first_kinds, &mut cache),
            });
            previous = Some(x);
        }

        Self {
            llm,
            examples: cached,
        }
    }

    /// Unregularized log-likelihood and its gradient over this shard.
    fn partial(&self) -> (f64, Vec<f64>) {
        let mut gradient = vec![0.0; self.llm.weights().len()];
        let mut log_likelihood = 0.0;

        for example in &self.examples {
            let log_p = self.llm.log_distribution(&example.indices);
            log_likelihood += log_p[example.truth];

            // expected counts
            for (active, lp) in example.indices.iter().zip(&log_p) {
                let p = lp.exp();
                for &i in active {
                    gradient[i] -= p;
                }
            }
            // empirical counts
            for &i in &example.indices[example.truth] {
                gradient[i] += 1.0;
            }
        }

        (log_likelihood, gradient)
    }
}

/// Group example indices by world and deal the groups round-robin.
///
/// Every example of one world lands in the same shard; each shard keeps
/// list order. Returns at most `shards` non-empty groups.
fn partition(examples: &[(Outcome, LlmX)], shards: usize) -> Vec<Vec<usize>> {
    // world -> position in `groups`, in first-seen order
    let mut group_of: HashMap<*const World, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, (_, x)) in examples.iter().enumerate() {
        let g = *group_of.entry(Arc::as_ptr(&x.world)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i);
    }

    let count = shards.max(1).min(groups.len().max(1));
    let mut out = vec![Vec::new(); count];
    for (g, members) in groups.into_iter().enumerate() {
        out[g % count].extend(members);
    }
    for members in &mut out {
        members.sort_unstable();
    }
    out.retain(|members| !members.is_empty());
    out
}

/// Regularized objective over all shards, negated for the minimizer.
struct ShardedObjective<'a> {
    pool: &'a ThreadPool,
    shards: &'a mut [Shard],
    lambda: f64,
}

impl ShardedObjective<'_> {
    /// `Σ log p(true) - λ/2 ‖w‖²` and its gradient.
    fn log_likelihood(&mut self, weights: &[f64]) -> (f64, Vec<f64>) {
        for shard in self.shards.iter_mut() {
            shard.llm.copy_weights_from(weights);
        }

        let shards: &[Shard] = &*self.shards;
        let partials: Vec<(f64, Vec<f64>)> =
            self.pool.install(|| shards.par_iter().map(Shard::partial).collect());

        let mut objective = 0.0;
        let mut gradient = vec![0.0; weights.len()];
        for (value, partial) in partials {
            objective += value;
            for (g, p) in gradient.iter_mut().zip(partial) {
                *g += p;
            }
        }

        let squared: f64 = weights.iter().map(|w| w * w).sum();
        objective -= 0.5 * self.lambda * squared;
        for (g, w) in gradient.iter_mut().zip(weights) {
            *g -= self.lambda * w;
        }
        (objective, gradient)
    }
}

impl Objective for ShardedObjective<'_> {
    fn evaluate(&mut self, x: &[f64], gradient: &mut [f64]) -> f64 {
        let (objective, ascent) = self.log_likelihood(x);
        for (g, a) in gradient.iter_mut().zip(ascent) {
            *g = -a;
        }
        -objective
    }
}

/// Fits the weights of a fixed feature set to labelled examples.
#[derive(Debug, Clone)]
pub struct Trainer {
    feature_set: Arc<FeatureSet>,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(feature_set: Arc<FeatureSet>, config: TrainingConfig) -> Self {
        Self {
            feature_set,
            config,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Position of each example's label in its domain.
    fn truths(examples: &[(Outcome, LlmX)]) -> Result<Vec<usize>, TrainingError> {
        if examples.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }
        examples
            .iter()
            .enumerate()
            .map(|(index, (label, x))| {
                if x.outcome_domain.is_empty() {
                    return Err(TrainingError::EmptyOutcomeDomain { index });
                }
                x.outcome_domain
                    .iter()
                    .position(|o| o == label)
                    .ok_or_else(|| TrainingError::LabelOutsideDomain {
                        index,
                        label: label.to_string(),
                    })
            })
            .collect()
    }

    fn pool(&self, threads: usize) -> Result<ThreadPool, TrainingError> {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("grounder-shard-{i}"))
            .build()
            .map_err(|e| TrainingError::InvalidConfig {
                reason: format!("cannot start worker pool: {e}"),
            })
    }

    fn shards(
        &self,
        pool: &ThreadPool,
        examples: &[(Outcome, LlmX)],
        truths: &[usize],
    ) -> Vec<Shard> {
        let groups = partition(examples, self.config.threads);
        let feature_set = &self.feature_set;
        pool.install(|| {
            groups
                .par_iter()
                .map(|members| Shard::build(Llm::new(feature_set.clone()), examples, members, truths))
                .collect()
        })
    }

    /// Train from zero weights, calling `on_iteration` after every accepted
    /// optimizer step.
    pub fn train<F>(
        &self,
        examples: &[(Outcome, LlmX)],
        mut on_iteration: F,
    ) -> Result<(Llm, TrainingReport), TrainingError>
    where
        F: FnMut(&IterationStats),
    {
        self.config.validate()?;
        let truths = Self::truths(examples)?;

        let pool = self.pool(self.config.threads)?;
        let mut shards = self.shards(&pool, examples, &truths);
        let shard_count = shards.len();
        debug!(
            examples = examples.len(),
            shards = shard_count,
            features = self.feature_set.len(),
            "precomputed active indices"
        );

        let mut objective = ShardedObjective {
            pool: &pool,
            shards: &mut shards,
            lambda: self.config.regularization,
        };
        let lbfgs_config = LbfgsConfig {
            memory: self.config.history,
            max_iterations: self.config.max_iterations,
            epsilon: self.config.epsilon,
            ..LbfgsConfig::default()
        };

        let result = lbfgs::minimize(
            &mut objective,
            vec![0.0; self.feature_set.len()],
            &lbfgs_config,
            |report| {
                let stats = IterationStats::from(report);
                info!(
                    iteration = stats.iteration,
                    objective = stats.objective,
                    gradient_norm = stats.gradient_norm,
                    weight_norm = stats.weight_norm,
                    step = stats.step,
                    "optimizer step"
                );
                on_iteration(&stats);
            },
        )?;

        let history: Vec<IterationStats> = result.iterations.iter().map(IterationStats::from).collect();
        if let Some((index, value)) = result
            .x
            .iter()
            .copied()
            .enumerate()
            .find(|(_, w)| !w.is_finite())
        {
            error!(index, value, "optimizer produced a non-finite weight");
            return Err(TrainingError::Diverged {
                iteration: history.len(),
                reason: format!("weight {index} is {value}"),
            });
        }

        info!(
            iterations = history.len(),
            termination = ?result.termination,
            objective = -result.value,
            "training finished"
        );

        let report = TrainingReport {
            history,
            termination: result.termination,
            objective: -result.value,
            examples: examples.len(),
            features: self.feature_set.len(),
            shards: shard_count,
        };
        let mut llm = Llm::new(self.feature_set.clone());
        llm.copy_weights_from(&result.x);
        Ok((llm, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::features::{ConjunctionFeature, Feature, ObjectTypeFeature, OutcomeFeature, WordFeature};

    fn feature_set() -> Arc<FeatureSet> {
        let compatible: Arc<dyn Feature> = Arc::new(OutcomeFeature::new(Outcome::Compatible, false));
        let conj = |word: &str, object_type: &str| -> Arc<dyn Feature> {
            let word: Arc<dyn Feature> = Arc::new(WordFeature::new(word, None, false));
            let is_type: Arc<dyn Feature> = Arc::new(ObjectTypeFeature::new(object_type, false));
            Arc::new(ConjunctionFeature::new(
                vec![compatible.clone(), word, is_type],
                false,
            ))
        };
        let features: Vec<Arc<dyn Feature>> = vec![
            compatible.clone(),
            conj("box", "box"),
            conj("ball", "ball"),
            conj("box", "ball"),
        ];
        Arc::new(FeatureSet::from_features(features))
    }

    /// "box" refers to both boxes, "ball" to the ball, in `worlds` copies of
    /// the block world.
    fn corpus(worlds: usize) -> Vec<(Outcome, LlmX)> {
        let mut examples = Vec::new();
        for _ in 0..worlds {
            let world = Arc::new(block_world());
            for (word, truth) in [("box", ["b0", "b1"].as_slice()), ("ball", ["s0"].as_slice())] {
                let phrase = Arc::new(noun_phrase(&[("NN", word)]));
                for id in ["b0", "b1", "s0"] {
                    let label = if truth.contains(&id) {
                        Outcome::Compatible
                    } else {
                        Outcome::Incompatible
                    };
                    let x = LlmX::new(
                        Arc::new(object(&world, id)),
                        Vec::new(),
                        phrase.clone(),
                        world.clone(),
                    );
                    examples.push((label, x));
                }
            }
        }
        examples
    }

    fn config(threads: usize) -> TrainingConfig {
        TrainingConfig {
            threads,
            regularization: 0.1,
            max_iterations: 50,
            ..TrainingConfig::default()
        }
    }

    fn sharded_value(examples: &[(Outcome, LlmX)], threads: usize, weights: &[f64]) -> (f64, Vec<f64>) {
        let trainer = Trainer::new(feature_set(), config(threads));
        let truths = Trainer::truths(examples).unwrap();
        let pool = trainer.pool(threads).unwrap();
        let mut shards = trainer.shards(&pool, examples, &truths);
        let mut objective = ShardedObjective {
            pool: &pool,
            shards: &mut shards,
            lambda: 0.1,
        };
        objective.log_likelihood(weights)
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let examples = corpus(2);
        let w = [0.3, -0.2, 0.5, 0.1];
        let (_, gradient) = sharded_value(&examples, 2, &w);

        let h = 1e-5;
        for i in 0..w.len() {
            let mut plus = w;
            let mut minus = w;
            plus[i] += h;
            minus[i] -= h;
            let numeric =
                (sharded_value(&examples, 2, &plus).0 - sharded_value(&examples, 2, &minus).0) / (2.0 * h);
            assert!(
                (numeric - gradient[i]).abs() < 1e-6,
                "weight {i}: numeric {numeric} vs analytic {}",
                gradient[i]
            );
        }
    }

    #[test]
    fn test_shard_count_does_not_change_objective() {
        let examples = corpus(3);
        let w = [0.4, 1.0, -0.7, 0.2];
        let (one, g1) = sharded_value(&examples, 1, &w);
        let (three, g3) = sharded_value(&examples, 3, &w);
        assert!((one - three).abs() < 1e-9);
        for (a, b) in g1.iter().zip(&g3) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cached_indices_match_direct_evaluation() {
        let examples = corpus(2);
        let trainer = Trainer::new(feature_set(), config(2));
        let truths = Trainer::truths(&examples).unwrap();
        let pool = trainer.pool(2).unwrap();
        let shards = trainer.shards(&pool, &examples, &truths);
        let groups = partition(&examples, 2);

        let set = feature_set();
        for (shard, members) in shards.iter().zip(&groups) {
            for (cached, &i) in shard.examples.iter().zip(members) {
                let x = &examples[i].1;
                let direct: Vec<Vec<usize>> = x
                    .outcome_domain
                    .iter()
                    .map(|&o| set.indices_uncached(&x.input(o)))
                    .collect();
                assert_eq!(cached.indices, direct);
                assert_eq!(cached.truth, truths[i]);
            }
        }
    }

    #[test]
    fn test_partition_keeps_worlds_together() {
        let examples = corpus(3);
        let groups = partition(&examples, 2);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), examples.len());

        for members in &groups {
            assert!(members.windows(2).all(|w| w[0] < w[1]));
        }
        let world_of = |i: usize| Arc::as_ptr(&examples[i].1.world) as usize;
        for (a, members) in groups.iter().enumerate() {
            for (b, others) in groups.iter().enumerate() {
                if a == b {
                    continue;
                }
                for &i in members {
                    assert!(others.iter().all(|&j| world_of(j) != world_of(i)));
                }
            }
        }

        // more threads than worlds: one shard per world
        assert_eq!(partition(&examples, 8).len(), 3);
    }

    #[test]
    fn test_partition_deals_interleaved_worlds() {
        // examples of three worlds, interleaved one at a time
        let by_world = corpus(3);
        let per_world = by_world.len() / 3;
        let examples: Vec<_> = (0..per_world)
            .flat_map(|k| (0..3).map(move |w| w * per_world + k))
            .map(|i| by_world[i].clone())
            .collect();

        let groups = partition(&examples, 2);
        let expected_first: Vec<usize> = (0..examples.len()).filter(|i| i % 3 != 1).collect();
        let expected_second: Vec<usize> = (0..examples.len()).filter(|i| i % 3 == 1).collect();
        assert_eq!(groups, vec![expected_first, expected_second]);

        let many = corpus(300);
        let groups = partition(&many, 4);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 75 * per_world));
    }

    #[test]
    fn test_training_is_monotone_and_learns() {
        let examples = corpus(2);
        let trainer = Trainer::new(feature_set(), config(2));
        let mut seen = Vec::new();
        let (llm, report) = trainer.train(&examples, |s| seen.push(s.objective)).unwrap();

        assert!(!report.history.is_empty());
        assert_eq!(seen.len(), report.history.len());
        for pair in seen.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12);
        }
        assert_eq!(report.examples, examples.len());
        assert_eq!(report.shards, 2);

        // box phrase, box candidate
        let x = &examples[0].1;
        assert!(llm.pygx(Outcome::Compatible, x) > 0.5);
        // box phrase, ball candidate
        let x = &examples[2].1;
        assert!(llm.pygx(Outcome::Compatible, x) < 0.5);
    }

    #[test]
    fn test_rejects_bad_input() {
        let trainer = Trainer::new(feature_set(), config(1));
        assert_eq!(
            trainer.train(&[], |_| {}).unwrap_err(),
            TrainingError::EmptyCorpus
        );

        let world = Arc::new(World::new(Vec::new()));
        let x = LlmX::new(
            Arc::new(crate::symbols::Grounding::index(1)),
            Vec::new(),
            Arc::new(noun_phrase(&[("NN", "box")])),
            world,
        );
        let err = trainer.train(&[(Outcome::Unknown, x.clone())], |_| {}).unwrap_err();
        assert!(matches!(err, TrainingError::LabelOutsideDomain { index: 0, .. }));

        let err = trainer
            .train(&[(Outcome::Compatible, x.with_domain(Vec::new()))], |_| {})
            .unwrap_err();
        assert_eq!(err, TrainingError::EmptyOutcomeDomain { index: 0 });

        let zero_threads = Trainer::new(feature_set(), config(0));
        assert!(matches!(
            zero_threads.train(&corpus(1), |_| {}).unwrap_err(),
            TrainingError::InvalidConfig { .. }
        ));
    }
}
