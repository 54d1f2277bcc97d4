//! Log-linear scorer: softmax over an outcome domain from active feature indices.

use std::sync::Arc;

use super::LlmX;
use crate::error::{ModelError, ModelResult};
use crate::features::{FeatureKinds, FeatureSet, LeafCache};
use crate::types::Outcome;

/// Log-linear model: a shared feature set and one weight per feature.
#[derive(Debug, Clone)]
pub struct Llm {
    feature_set: Arc<FeatureSet>,
    weights: Vec<f64>,
}

impl Llm {
    /// Zero-initialised weights.
    pub fn new(feature_set: Arc<FeatureSet>) -> Self {
        let weights = vec![0.0; feature_set.len()];
        Self {
            feature_set,
            weights,
        }
    }

    /// Weights must cover every feature; extra trailing weights are kept.
    pub fn with_weights(feature_set: Arc<FeatureSet>, weights: Vec<f64>) -> ModelResult<Self> {
        let mut llm = Self::new(feature_set);
        llm.set_weights(weights)?;
        Ok(llm)
    }

    pub fn set_weights(&mut self, weights: Vec<f64>) -> ModelResult<()> {
        if weights.len() < self.feature_set.len() {
            return Err(ModelError::WeightCountMismatch {
                weights: weights.len(),
                features: self.feature_set.len(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    /// Overwrite weights in place without reallocating.
    ///
    /// Used when broadcasting the optimizer's point to training replicas.
    pub(crate) fn copy_weights_from(&mut self, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.weights.len());
        self.weights.copy_from_slice(weights);
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn feature_set(&self) -> &Arc<FeatureSet> {
        &self.feature_set
    }

    pub fn num_features(&self) -> usize {
        self.feature_set.len()
    }

    /// Index of the first non-finite weight, if any.
    pub fn first_non_finite(&self) -> Option<(usize, f64)> {
        self.weights
            .iter()
            .copied()
            .enumerate()
            .find(|(_, w)| !w.is_finite())
    }

    /// Sum of the weights of the given active features.
    pub fn score(&self, indices: &[usize]) -> f64 {
        indices.iter().map(|&i| self.weights[i]).sum()
    }

    /// Active feature indices for every outcome in `x`'s domain.
    ///
    /// Syntax leaves are evaluated for the first outcome only and reused for
    /// the rest through `cache`. Pass `FeatureKinds::GROUNDING` as
    /// `first_kinds` when the cache already holds this phrase's syntax values.
    pub fn domain_indices_with(
        &self,
        x: &LlmX,
        first_kinds: FeatureKinds,
        cache: &mut LeafCache,
    ) -> Vec<Vec<usize>> {
        x.outcome_domain
            .iter()
            .enumerate()
            .map(|(i, &outcome)| {
                let kinds = if i == 0 {
                    first_kinds
                } else {
                    FeatureKinds::GROUNDING
                };
                self.feature_set.indices(&x.input(outcome), kinds, cache)
            })
            .collect()
    }

    pub fn domain_indices(&self, x: &LlmX) -> Vec<Vec<usize>> {
        self.domain_indices_with(x, FeatureKinds::ALL, &mut LeafCache::new())
    }

    /// Softmax over outcomes given each outcome's active features.
    ///
    /// Scores are shifted by their maximum before exponentiation, which
    /// leaves the distribution unchanged and keeps `exp` finite.
    pub fn distribution(&self, indices: &[Vec<usize>]) -> Vec<f64> {
        self.log_distribution(indices)
            .into_iter()
            .map(f64::exp)
            .collect()
    }

    /// Log-softmax: `score(c) - log Σ exp(score)`, computed with the same
    /// max shift as [`Llm::distribution`].
    pub fn log_distribution(&self, indices: &[Vec<usize>]) -> Vec<f64> {
        debug_assert!(!indices.is_empty(), "empty outcome domain");
        let scores: Vec<f64> = indices.iter().map(|active| self.score(active)).collect();
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = scores.iter().map(|s| (s - max).exp()).sum();
        let log_partition = max + total.ln();
        scores.into_iter().map(|s| s - log_partition).collect()
    }

    /// `P(domain[target] | x)` from precomputed per-outcome indices.
    ///
    /// The single scoring path shared by training and inference.
    pub fn pygx_indexed(&self, target: usize, indices: &[Vec<usize>]) -> f64 {
        self.distribution(indices)[target]
    }

    /// `log P(domain[target] | x)`; stays finite where `pygx_indexed`
    /// would underflow to zero.
    pub fn log_pygx_indexed(&self, target: usize, indices: &[Vec<usize>]) -> f64 {
        self.log_distribution(indices)[target]
    }

    /// `P(outcome | x)` normalised over `x.outcome_domain`.
    ///
    /// An outcome outside the domain has probability zero.
    pub fn pygx(&self, outcome: Outcome, x: &LlmX) -> f64 {
        debug_assert!(!x.outcome_domain.is_empty(), "empty outcome domain");
        let Some(target) = x.outcome_domain.iter().position(|&o| o == outcome) else {
            return 0.0;
        };
        self.pygx_indexed(target, &self.domain_indices(x))
    }

    /// Most probable outcome and its probability. Ties go to the earlier
    /// outcome in the domain.
    pub fn best_outcome(&self, x: &LlmX) -> (Outcome, f64) {
        let dist = self.distribution(&self.domain_indices(x));
        let mut best = (x.outcome_domain[0], dist[0]);
        for (&outcome, &p) in x.outcome_domain.iter().zip(&dist).skip(1) {
            if p > best.1 {
                best = (outcome, p);
            }
        }
        best
    }
}
