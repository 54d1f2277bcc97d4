//! Name-to-constructor registry for feature kinds.
//!
//! Loading a model walks its feature configurations and asks the registry to
//! build each one. Adding a kind means registering one more factory; nothing
//! in the indexer or the scorer changes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    ChildClassFeature, ChildMatchFeature, ClassMatchFeature, ConjunctionFeature,
    ContainerSizeFeature, Feature, FeatureConfig, IndexedMergeFeature, NumChildPhrasesFeature,
    NumWordsFeature, ObjectTypeFeature, OutcomeFeature, PhraseTypeFeature, PropertyMatchFeature,
    ShapeFeature, SortIndexFeature, WordFeature,
};
use crate::error::{ModelError, ModelResult};

/// Builds one feature instance from its configuration.
///
/// Receives the registry so composites can build their parts.
pub type FeatureFactory =
    Box<dyn Fn(&FeatureConfig, &FeatureRegistry) -> ModelResult<Arc<dyn Feature>> + Send + Sync>;

pub struct FeatureRegistry {
    factories: BTreeMap<String, FeatureFactory>,
}

impl FeatureRegistry {
    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&FeatureConfig, &FeatureRegistry) -> ModelResult<Arc<dyn Feature>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Convenience builder pattern
    pub fn with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&FeatureConfig, &FeatureRegistry) -> ModelResult<Arc<dyn Feature>>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, factory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build a feature; unknown kinds are a configuration error.
    pub fn build(&self, config: &FeatureConfig) -> ModelResult<Arc<dyn Feature>> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ModelError::UnknownFeatureKind {
                kind: config.kind.clone(),
            })?;
        factory(config, self)
    }
}

fn leaf<T, F>(build: F) -> impl Fn(&FeatureConfig, &FeatureRegistry) -> ModelResult<Arc<dyn Feature>>
where
    T: Feature + 'static,
    F: Fn(&FeatureConfig) -> ModelResult<T>,
{
    move |config, _| Ok(Arc::new(build(config)?) as Arc<dyn Feature>)
}

impl Default for FeatureRegistry {
    /// Every kind this crate ships.
    fn default() -> Self {
        FeatureRegistry::empty()
            .with(WordFeature::KIND, leaf(WordFeature::from_config))
            .with(PhraseTypeFeature::KIND, leaf(PhraseTypeFeature::from_config))
            .with(NumWordsFeature::KIND, leaf(NumWordsFeature::from_config))
            .with(
                NumChildPhrasesFeature::KIND,
                leaf(NumChildPhrasesFeature::from_config),
            )
            .with(OutcomeFeature::KIND, leaf(OutcomeFeature::from_config))
            .with(ClassMatchFeature::KIND, leaf(ClassMatchFeature::from_config))
            .with(ObjectTypeFeature::KIND, leaf(ObjectTypeFeature::from_config))
            .with(PropertyMatchFeature::KIND, leaf(PropertyMatchFeature::from_config))
            .with(ContainerSizeFeature::KIND, leaf(ContainerSizeFeature::from_config))
            .with(ChildMatchFeature::KIND, leaf(ChildMatchFeature::from_config))
            .with(ChildClassFeature::KIND, leaf(ChildClassFeature::from_config))
            .with(SortIndexFeature::KIND, leaf(SortIndexFeature::from_config))
            .with(IndexedMergeFeature::KIND, leaf(IndexedMergeFeature::from_config))
            .with(ShapeFeature::KIND, leaf(ShapeFeature::from_config))
            .with(ConjunctionFeature::KIND, |config, registry| {
                Ok(Arc::new(ConjunctionFeature::from_config(config, registry)?) as Arc<dyn Feature>)
            })
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::features::{FeatureInput, FeatureKind};
    use crate::symbols::{Container, Grounding};
    use crate::types::Outcome;
    use crate::world::World;

    fn sample_configs() -> Vec<FeatureConfig> {
        vec![
            FeatureConfig::new("word").with_param("word", "box"),
            FeatureConfig::new("num_words")
                .with_param("count", 2i64)
                .with_param("cmp", "le"),
            FeatureConfig::new("outcome").with_param("outcome", "compatible"),
            FeatureConfig::new("class_match").with_param("class", "object"),
            FeatureConfig::new("object_type").with_param("type", "box"),
            FeatureConfig::new("property_match")
                .with_param("key", "color")
                .with_param("value", "red"),
            FeatureConfig::new("container_size").with_param("count", 2i64),
            FeatureConfig::new("sort_index")
                .with_param("criterion", "left")
                .with_param("index", 1i64),
            FeatureConfig::new("shape").with_param("shape", "row"),
        ]
    }

    fn candidates(world: &World) -> Vec<Grounding> {
        vec![
            object(world, "b0"),
            object(world, "b1"),
            object(world, "s0"),
            Grounding::number(2),
            Grounding::spatial_relation("left"),
            Grounding::Container(Container {
                shape: "row".into(),
                objects: world.objects_of_type("box").cloned().collect(),
            }),
        ]
    }

    #[test]
    fn test_default_kinds() {
        let registry = FeatureRegistry::default();
        for kind in [
            "word",
            "phrase_type",
            "num_words",
            "num_child_phrases",
            "outcome",
            "class_match",
            "object_type",
            "property_match",
            "container_size",
            "child_match",
            "child_class",
            "sort_index",
            "indexed_merge",
            "shape",
            "conjunction",
        ] {
            assert!(registry.contains(kind), "missing {}", kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_error() {
        let registry = FeatureRegistry::default();
        let err = registry.build(&FeatureConfig::new("telepathy")).unwrap_err();
        assert!(matches!(err, ModelError::UnknownFeatureKind { .. }));
    }

    #[test]
    fn test_custom_kind_is_pluggable() {
        #[derive(Debug)]
        struct Always;

        impl Feature for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn kind(&self) -> FeatureKind {
                FeatureKind::Syntax
            }
            fn invert(&self) -> bool {
                false
            }
            fn decide(&self, _: &crate::features::FeatureInput<'_>) -> Option<bool> {
                Some(true)
            }
            fn config(&self) -> FeatureConfig {
                FeatureConfig::new("always")
            }
        }

        let registry = FeatureRegistry::default()
            .with("always", |_, _| Ok(Arc::new(Always) as Arc<dyn Feature>));
        let feature = registry.build(&FeatureConfig::new("always")).unwrap();
        assert_eq!(feature.name(), "always");
    }

    proptest! {
        #[test]
        fn test_invert_symmetry(
            kind in 0usize..9,
            candidate in 0usize..6,
            compatible in any::<bool>(),
        ) {
            let registry = FeatureRegistry::default();
            let world = block_world();
            let phrase = noun_phrase(&[("DT", "the"), ("NN", "box")]);
            let candidates = candidates(&world);
            let outcome = if compatible { Outcome::Compatible } else { Outcome::Incompatible };
            let input = FeatureInput::new(outcome, &candidates[candidate], &[], &phrase, &world);

            let config = sample_configs().swap_remove(kind);
            let plain = registry.build(&config).unwrap();
            let inverted = registry.build(&config.inverted(true)).unwrap();

            // inapplicable inputs are false both ways
            if plain.decide(&input).is_some() {
                prop_assert_ne!(plain.value(&input), inverted.value(&input));
            } else {
                prop_assert!(!plain.value(&input));
                prop_assert!(!inverted.value(&input));
            }
        }
    }
}
