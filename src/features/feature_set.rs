//! The active-feature indexer.
//!
//! A [`FeatureSet`] is the ordered, append-only list of features in a model;
//! a feature's position is its global index and lines up with the weight
//! vector.
//!
//! # Leaf decomposition
//!
//! Most features in a trained model are conjunctions that share parts:
//!
//! ```text
//! #0  outcome=compatible ∧ word=left  ∧ class=region
//! #1  outcome=compatible ∧ word=left  ∧ class=object
//! #2  outcome=compatible ∧ word=block ∧ class=object
//!     └──── shared ────┘   └ syntax ┘   └ grounding ┘
//! ```
//!
//! When a feature is pushed, non-inverted conjunctions are flattened into
//! leaves and leaves are deduplicated by signature. A call evaluates each
//! distinct leaf at most once, then a feature fires iff all of its leaves do.
//!
//! # Kind mask and cache
//!
//! Leaf values live in a caller-owned [`LeafCache`]. The per-call
//! [`FeatureKinds`] mask says which leaf kinds to recompute; leaves of other
//! kinds reuse their cached values. Scoring several outcomes against one
//! phrase passes `ALL` for the first outcome and `GROUNDING` afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Feature, FeatureConfig, FeatureInput, FeatureKind, FeatureKinds, FeatureRegistry};
use crate::error::ModelResult;

#[derive(Debug)]
struct Leaf {
    feature: Arc<dyn Feature>,
    kind: FeatureKind,
}

/// Last computed leaf values, owned by whoever iterates outcomes.
#[derive(Debug, Clone, Default)]
pub struct LeafCache {
    values: Vec<bool>,
    evaluated: Vec<bool>,
}

impl LeafCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every cached value (e.g. when moving to a different phrase).
    pub fn invalidate(&mut self) {
        self.evaluated.iter_mut().for_each(|e| *e = false);
    }

    fn ensure(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, false);
            self.evaluated.resize(len, false);
        }
    }
}

/// Ordered registry of features with leaf-level evaluation sharing.
#[derive(Default)]
pub struct FeatureSet {
    features: Vec<Arc<dyn Feature>>,
    leaves: Vec<Leaf>,
    leaf_slots: HashMap<String, usize>,
    /// Leaf slots each feature needs, all of which must fire
    plans: Vec<Vec<usize>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features(features: impl IntoIterator<Item = Arc<dyn Feature>>) -> Self {
        let mut set = Self::new();
        for feature in features {
            set.push(feature);
        }
        set
    }

    /// Build every configuration through the registry, failing on the first
    /// bad one.
    pub fn from_configs(configs: &[FeatureConfig], registry: &FeatureRegistry) -> ModelResult<Self> {
        let mut set = Self::new();
        for config in configs {
            set.push(registry.build(config)?);
        }
        Ok(set)
    }

    /// Append a feature; returns its global index.
    pub fn push(&mut self, feature: Arc<dyn Feature>) -> usize {
        let mut parts = Vec::new();
        flatten(&feature, &mut parts);

        let mut plan: Vec<usize> = parts.into_iter().map(|leaf| self.leaf_slot(leaf)).collect();
        plan.sort_unstable();
        plan.dedup();

        self.features.push(feature);
        self.plans.push(plan);
        self.features.len() - 1
    }

    fn leaf_slot(&mut self, feature: Arc<dyn Feature>) -> usize {
        let signature = feature.signature();
        if let Some(&slot) = self.leaf_slots.get(&signature) {
            return slot;
        }
        let slot = self.leaves.len();
        self.leaves.push(Leaf {
            kind: feature.kind(),
            feature,
        });
        self.leaf_slots.insert(signature, slot);
        slot
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Distinct leaf predicates after decomposition.
    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn feature(&self, index: usize) -> Option<&Arc<dyn Feature>> {
        self.features.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Feature>> {
        self.features.iter()
    }

    pub fn configs(&self) -> Vec<FeatureConfig> {
        self.features.iter().map(|f| f.config()).collect()
    }

    /// Global indices of the features that fire, ascending.
    pub fn indices(&self, input: &FeatureInput<'_>, kinds: FeatureKinds, cache: &mut LeafCache) -> Vec<usize> {
        debug_assert!(
            input
                .children
                .iter()
                .all(|child| input.phrase.is_child(&child.phrase)),
            "child groundings must come from the phrase's own children"
        );

        cache.ensure(self.leaves.len());
        for (slot, leaf) in self.leaves.iter().enumerate() {
            if kinds.contains(leaf.kind) || !cache.evaluated[slot] {
                cache.values[slot] = leaf.feature.value(input);
                cache.evaluated[slot] = true;
            }
        }

        self.plans
            .iter()
            .enumerate()
            .filter(|(_, plan)| plan.iter().all(|&slot| cache.values[slot]))
            .map(|(index, _)| index)
            .collect()
    }

    /// Like [`indices`](Self::indices) but also hands back the firing features.
    pub fn active_features(
        &self,
        input: &FeatureInput<'_>,
        kinds: FeatureKinds,
        cache: &mut LeafCache,
    ) -> Vec<(usize, &Arc<dyn Feature>)> {
        self.indices(input, kinds, cache)
            .into_iter()
            .map(|i| (i, &self.features[i]))
            .collect()
    }

    /// Evaluate every feature directly, bypassing leaves and caches.
    pub fn indices_uncached(&self, input: &FeatureInput<'_>) -> Vec<usize> {
        self.features
            .iter()
            .enumerate()
            .filter(|(_, f)| f.value(input))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Non-inverted conjunctions dissolve into their parts; everything else is a leaf.
fn flatten(feature: &Arc<dyn Feature>, out: &mut Vec<Arc<dyn Feature>>) {
    match feature.parts() {
        Some(parts) if !feature.invert() => {
            for part in parts {
                flatten(part, out);
            }
        }
        _ => out.push(feature.clone()),
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSet")
            .field("features", &self.features.len())
            .field("leaves", &self.leaves.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::features::{
        ClassMatchFeature, ConjunctionFeature, ObjectTypeFeature, OutcomeFeature, WordFeature,
    };
    use crate::types::Outcome;

    fn conj(parts: Vec<Arc<dyn Feature>>) -> Arc<dyn Feature> {
        Arc::new(ConjunctionFeature::new(parts, false))
    }

    fn sample_set() -> FeatureSet {
        let compatible: Arc<dyn Feature> = Arc::new(OutcomeFeature::new(Outcome::Compatible, false));
        let word_box: Arc<dyn Feature> = Arc::new(WordFeature::new("box", None, false));
        let is_box: Arc<dyn Feature> = Arc::new(ObjectTypeFeature::new("box", false));
        let incompatible: Arc<dyn Feature> = Arc::new(OutcomeFeature::new(Outcome::Incompatible, false));
        let not_box: Arc<dyn Feature> = Arc::new(ObjectTypeFeature::new("box", true));
        let features: Vec<Arc<dyn Feature>> = vec![
            conj(vec![compatible.clone(), word_box.clone(), is_box.clone()]),
            conj(vec![incompatible, word_box.clone(), not_box]),
            compatible,
            Arc::new(ClassMatchFeature::new("region", false)),
            Arc::new(ConjunctionFeature::new(vec![word_box, is_box], true)),
        ];
        FeatureSet::from_features(features)
    }

    #[test]
    fn test_leaves_are_shared() {
        let set = sample_set();
        assert_eq!(set.len(), 5);
        // outcome=c, word=box, type=box, outcome=i, type!=box, class=region, inverted conj
        assert_eq!(set.num_leaves(), 7);
    }

    #[test]
    fn test_indices_per_outcome() {
        let world = block_world();
        let phrase = noun_phrase(&[("DT", "the"), ("NN", "box")]);
        let g = object(&world, "b0");
        let set = sample_set();
        let mut cache = LeafCache::new();

        let input = FeatureInput::new(Outcome::Compatible, &g, &[], &phrase, &world);
        assert_eq!(set.indices(&input, FeatureKinds::ALL, &mut cache), vec![0, 2]);

        let input = input.with_outcome(Outcome::Incompatible);
        assert!(set.indices(&input, FeatureKinds::GROUNDING, &mut cache).is_empty());
    }

    #[test]
    fn test_cached_matches_uncached() {
        let world = block_world();
        let set = sample_set();
        let mut cache = LeafCache::new();

        let box_phrase = noun_phrase(&[("NN", "box")]);
        let ball_phrase = noun_phrase(&[("NN", "ball")]);
        for phrase in [&box_phrase, &ball_phrase] {
            cache.invalidate();
            for (i, id) in ["b0", "s0"].iter().enumerate() {
                let g = object(&world, id);
                for (j, outcome) in Outcome::BINARY.into_iter().enumerate() {
                    let kinds = if i == 0 && j == 0 {
                        FeatureKinds::ALL
                    } else {
                        FeatureKinds::GROUNDING
                    };
                    let input = FeatureInput::new(outcome, &g, &[], phrase, &world);
                    assert_eq!(
                        set.indices(&input, kinds, &mut cache),
                        set.indices_uncached(&input)
                    );
                }
            }
        }
    }

    #[test]
    fn test_cold_cache_evaluates_masked_kinds() {
        let world = block_world();
        let phrase = noun_phrase(&[("NN", "box")]);
        let g = object(&world, "b0");
        let set = sample_set();
        let mut cache = LeafCache::new();

        let input = FeatureInput::new(Outcome::Compatible, &g, &[], &phrase, &world);
        assert_eq!(
            set.indices(&input, FeatureKinds::GROUNDING, &mut cache),
            set.indices_uncached(&input)
        );
    }
}
