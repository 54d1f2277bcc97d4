//! Feature-set templates.
//!
//! A fresh model starts from a cross product: every outcome, times every
//! syntactic cue seen in the corpus (words and phrase tags), times every
//! grounding predicate instance. Each product is one conjunction feature.
//! Per-outcome predicate biases (no syntactic cue) are added as well.

use std::collections::BTreeSet;

use tracing::debug;

use super::{FeatureConfig, FeatureRegistry, FeatureSet};
use crate::error::ModelResult;
use crate::language::{Phrase, PhraseKind};
use crate::types::Outcome;
use crate::world::{SortCriterion, World};

const CLASSES: [&str; 11] = [
    "object",
    "region",
    "container",
    "constraint",
    "spatial_relation",
    "object_property",
    "abstract_container",
    "object_type",
    "object_color",
    "index",
    "number",
];

const RELATIONS: [&str; 8] = ["front", "back", "left", "right", "near", "far", "top", "bottom"];

const CHILD_CLASSES: [&str; 5] = ["object", "object_type", "index", "spatial_relation", "region"];

const MAX_COUNT: i64 = 4;

/// Vocabulary collected from a corpus, expanded into a feature set.
#[derive(Debug, Clone)]
pub struct FeatureTemplates {
    outcomes: Vec<Outcome>,
    words: BTreeSet<String>,
    phrase_kinds: BTreeSet<PhraseKind>,
    object_types: BTreeSet<String>,
    colors: BTreeSet<String>,
}

impl Default for FeatureTemplates {
    fn default() -> Self {
        Self {
            outcomes: Outcome::BINARY.to_vec(),
            words: BTreeSet::new(),
            phrase_kinds: BTreeSet::new(),
            object_types: BTreeSet::new(),
            colors: BTreeSet::new(),
        }
    }
}

impl FeatureTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(mut self, outcomes: &[Outcome]) -> Self {
        self.outcomes = outcomes.to_vec();
        self
    }

    /// Record the words and tags of a phrase and its descendants.
    pub fn add_phrase(&mut self, phrase: &Phrase) {
        self.phrase_kinds.insert(phrase.kind);
        for word in &phrase.words {
            self.words.insert(word.text.to_ascii_lowercase());
        }
        for child in &phrase.children {
            self.add_phrase(child);
        }
    }

    /// Record the object types and colors present in a world.
    pub fn add_world(&mut self, world: &World) {
        self.object_types
            .extend(world.object_types().iter().map(|t| t.to_string()));
        self.colors.extend(world.colors().iter().map(|c| c.to_string()));
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Grounding predicate instances crossed with every cue.
    fn predicates(&self) -> Vec<FeatureConfig> {
        let mut out: Vec<FeatureConfig> = CLASSES
            .iter()
            .map(|c| FeatureConfig::new("class_match").with_param("class", *c))
            .collect();

        for t in &self.object_types {
            out.push(FeatureConfig::new("object_type").with_param("type", t.as_str()));
        }
        for c in &self.colors {
            out.push(
                FeatureConfig::new("property_match")
                    .with_param("key", "color")
                    .with_param("value", c.as_str()),
            );
        }
        for r in RELATIONS {
            out.push(
                FeatureConfig::new("property_match")
                    .with_param("key", "relation")
                    .with_param("value", r),
            );
        }
        for n in 1..=MAX_COUNT {
            out.push(
                FeatureConfig::new("property_match")
                    .with_param("key", "index")
                    .with_param("value", n)
                    .with_param("class", "index"),
            );
            out.push(
                FeatureConfig::new("property_match")
                    .with_param("key", "number")
                    .with_param("value", n)
                    .with_param("class", "number"),
            );
            out.push(FeatureConfig::new("container_size").with_param("count", n));
        }
        for relation in ["equal", "region_object", "container_member"] {
            out.push(FeatureConfig::new("child_match").with_param("relation", relation));
        }
        for class in CHILD_CLASSES {
            out.push(FeatureConfig::new("child_class").with_param("class", class));
        }
        for r in RELATIONS {
            if let Some(criterion) = SortCriterion::from_relation(r) {
                out.push(
                    FeatureConfig::new("sort_index")
                        .with_param("criterion", criterion.as_str())
                        .with_param("index", 1i64),
                );
            }
        }
        out.push(FeatureConfig::new("indexed_merge"));
        for shape in ["row", "column", "tower", "group"] {
            out.push(FeatureConfig::new("shape").with_param("shape", shape));
        }
        out
    }

    fn cues(&self) -> Vec<FeatureConfig> {
        let words = self
            .words
            .iter()
            .map(|w| FeatureConfig::new("word").with_param("word", w.as_str()));
        let kinds = self
            .phrase_kinds
            .iter()
            .map(|k| FeatureConfig::new("phrase_type").with_param("phrase_type", k.as_str()));
        words.chain(kinds).collect()
    }

    /// Every feature configuration, in global-index order.
    pub fn configs(&self) -> Vec<FeatureConfig> {
        let predicates = self.predicates();
        let cues = self.cues();
        let mut out = Vec::with_capacity(self.outcomes.len() * (cues.len() + 1) * predicates.len());

        for outcome in &self.outcomes {
            let outcome_leaf = FeatureConfig::new("outcome").with_param("outcome", outcome.as_str());
            for predicate in &predicates {
                out.push(
                    FeatureConfig::new("conjunction")
                        .with_part(outcome_leaf.clone())
                        .with_part(predicate.clone()),
                );
                for cue in &cues {
                    out.push(
                        FeatureConfig::new("conjunction")
                            .with_part(outcome_leaf.clone())
                            .with_part(cue.clone())
                            .with_part(predicate.clone()),
                    );
                }
            }
        }
        out
    }

    pub fn build(&self, registry: &FeatureRegistry) -> ModelResult<FeatureSet> {
        let configs = self.configs();
        let set = FeatureSet::from_configs(&configs, registry)?;
        debug!(
            features = set.len(),
            leaves = set.num_leaves(),
            words = self.words.len(),
            "built feature set from templates"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, noun_phrase};

    #[test]
    fn test_template_cross_product() {
        let mut templates = FeatureTemplates::new();
        templates.add_phrase(&noun_phrase(&[("DT", "the"), ("NN", "box")]));
        templates.add_world(&block_world());

        let predicates = templates.predicates().len();
        let cues = 2 + 1; // two words, one tag
        let configs = templates.configs();
        assert_eq!(configs.len(), 2 * predicates * (cues + 1));

        let set = templates.build(&FeatureRegistry::default()).unwrap();
        assert_eq!(set.len(), configs.len());
        // 2 outcomes + cues + predicates, each evaluated once
        assert_eq!(set.num_leaves(), 2 + cues + predicates);
    }
}
