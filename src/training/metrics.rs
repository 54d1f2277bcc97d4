//! Evaluation metrics for grounding decisions.
//!
//! ## Metrics Overview
//!
//! | Metric              | What it measures                                      | Range     |
//! |---------------------|-------------------------------------------------------|-----------|
//! | Accuracy            | Fraction of examples whose arg-max outcome is correct | 0.0-1.0   |
//! | Precision           | Predicted-compatible examples that are compatible     | 0.0-1.0   |
//! | Recall              | Compatible examples predicted compatible              | 0.0-1.0   |
//! | F1                  | Harmonic mean of precision and recall                 | 0.0-1.0   |
//! | Mean log-likelihood | Average log P(true outcome \| x)                      | (-inf, 0] |
//!
//! Precision, recall and F1 treat `compatible` as the positive class. The
//! negatives vastly outnumber the positives in an enumerated search space,
//! so accuracy alone flatters a model that never says yes.
//!
//! ## Aggregation
//!
//! Per-example results are collected first, then aggregated; the standard
//! deviation of the log-likelihood is reported for comparing runs.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::{Llm, LlmX};
use crate::types::Outcome;

/// Aggregated evaluation metrics over a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: f64,

    /// Positive class: compatible
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,

    pub mean_log_likelihood: f64,
    pub log_likelihood_std: f64,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// Number of cases evaluated
    pub n_cases: usize,
}

impl EvalMetrics {
    /// Aggregate metrics from per-case results.
    pub fn aggregate(per_case: &[CaseMetrics]) -> Self {
        if per_case.is_empty() {
            return Self::default();
        }

        let correct = per_case.iter().filter(|c| c.is_correct()).count();
        let positive = |o: Outcome| o == Outcome::Compatible;
        let tp = per_case
            .iter()
            .filter(|c| positive(c.predicted) && positive(c.actual))
            .count();
        let fp = per_case
            .iter()
            .filter(|c| positive(c.predicted) && !positive(c.actual))
            .count();
        let fn_ = per_case
            .iter()
            .filter(|c| !positive(c.predicted) && positive(c.actual))
            .count();

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let ll: Vec<_> = per_case.iter().map(|c| c.log_likelihood).collect();
        let (mean_log_likelihood, log_likelihood_std) = log_likelihood_stats(&ll);

        Self {
            accuracy: ratio(correct, per_case.len()),
            precision,
            recall,
            f1,
            mean_log_likelihood,
            log_likelihood_std,
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            n_cases: per_case.len(),
        }
    }

    /// Score every example with `llm` and aggregate.
    pub fn evaluate(llm: &Llm, examples: &[(Outcome, LlmX)]) -> Self {
        let per_case: Vec<CaseMetrics> = examples
            .par_iter()
            .map(|(label, x)| CaseMetrics::compute(llm, *label, x))
            .collect();
        Self::aggregate(&per_case)
    }
}

/// Metrics for a single labelled example.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaseMetrics {
    pub actual: Outcome,
    pub predicted: Outcome,
    /// Probability the model assigns to `actual`
    pub probability: f64,
    pub log_likelihood: f64,
}

impl CaseMetrics {
    /// Score one example.
    ///
    /// A label outside the example's domain gets probability zero and a
    /// log-likelihood of negative infinity.
    pub fn compute(llm: &Llm, actual: Outcome, x: &LlmX) -> Self {
        let indices = llm.domain_indices(x);
        let (predicted, _) = llm.best_outcome(x);
        let (probability, log_likelihood) = match x.outcome_domain.iter().position(|&o| o == actual) {
            Some(target) => (
                llm.pygx_indexed(target, &indices),
                llm.log_pygx_indexed(target, &indices),
            ),
            None => (0.0, f64::NEG_INFINITY),
        };
        Self {
            actual,
            predicted,
            probability,
            log_likelihood,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.actual == self.predicted
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Mean and sample standard deviation in one pass (Welford).
///
/// Fewer than two values have no spread; an empty slice is all zeros.
fn log_likelihood_stats(values: &[f64]) -> (f64, f64) {
    let (count, mean, m2) = values.iter().fold((0usize, 0.0f64, 0.0f64), |(n, mean, m2), &v| {
        let n = n + 1;
        let delta = v - mean;
        let mean = mean + delta / n as f64;
        (n, mean, m2 + delta * (v - mean))
    });
    match count {
        0 => (0.0, 0.0),
        1 => (mean, 0.0),
        n => (mean, (m2 / (n - 1) as f64).sqrt()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(actual: Outcome, predicted: Outcome, probability: f64) -> CaseMetrics {
        CaseMetrics {
            actual,
            predicted,
            probability,
            log_likelihood: probability.ln(),
        }
    }

    #[test]
    fn test_aggregate_confusion() {
        use Outcome::{Compatible as C, Incompatible as I};
        let cases = vec![
            case(C, C, 0.9),
            case(C, I, 0.4),
            case(I, C, 0.3),
            case(I, I, 0.8),
            case(I, I, 0.7),
        ];
        let m = EvalMetrics::aggregate(&cases);
        assert_eq!(m.n_cases, 5);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert_eq!((m.true_positives, m.false_positives, m.false_negatives), (1, 1, 1));
        assert!((m.precision - 0.5).abs() < 1e-12);
        assert!((m.recall - 0.5).abs() < 1e-12);
        assert!((m.f1 - 0.5).abs() < 1e-12);

        let expected_ll = [0.9f64, 0.4, 0.3, 0.8, 0.7].iter().map(|p| p.ln()).sum::<f64>() / 5.0;
        assert!((m.mean_log_likelihood - expected_ll).abs() < 1e-12);
        assert!(m.log_likelihood_std > 0.0);
    }

    #[test]
    fn test_no_positive_predictions() {
        let cases = vec![
            case(Outcome::Compatible, Outcome::Incompatible, 0.2),
            case(Outcome::Incompatible, Outcome::Incompatible, 0.8),
        ];
        let m = EvalMetrics::aggregate(&cases);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert!((m.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_log_likelihood_stats() {
        let (mean, std) = log_likelihood_stats(&[-1.0, -2.0, -3.0, -4.0]);
        assert!((mean + 2.5).abs() < 1e-12);
        // sample variance of {1,2,3,4} is 5/3
        assert!((std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);

        assert_eq!(log_likelihood_stats(&[-0.7]), (-0.7, 0.0));
        assert_eq!(log_likelihood_stats(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_empty_is_default() {
        let m = EvalMetrics::aggregate(&[]);
        assert_eq!(m.n_cases, 0);
        assert_eq!(m.accuracy, 0.0);
    }

    #[test]
    fn test_compute_untrained_model() {
        use crate::features::test_support::{block_world, noun_phrase, object};
        use crate::features::{Feature, FeatureSet, OutcomeFeature};
        use std::sync::Arc;

        let features: Vec<Arc<dyn Feature>> =
            vec![Arc::new(OutcomeFeature::new(Outcome::Compatible, false))];
        let llm = Llm::new(Arc::new(FeatureSet::from_features(features)));
        let world = block_world();
        let x = LlmX::new(
            Arc::new(object(&world, "b0")),
            Vec::new(),
            Arc::new(noun_phrase(&[("NN", "box")])),
            Arc::new(world),
        );

        let c = CaseMetrics::compute(&llm, Outcome::Incompatible, &x);
        // zero weights: a uniform tie, resolved toward the first outcome
        assert_eq!(c.predicted, Outcome::Compatible);
        assert!((c.probability - 0.5).abs() < 1e-12);
        assert!((c.log_likelihood - 0.5f64.ln()).abs() < 1e-12);
        assert!(!c.is_correct());

        let c = CaseMetrics::compute(&llm, Outcome::Unknown, &x);
        assert_eq!(c.probability, 0.0);
        assert_eq!(c.log_likelihood, f64::NEG_INFINITY);
    }
}
