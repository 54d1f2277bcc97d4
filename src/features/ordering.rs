//! Predicates over the world's precomputed orderings.

use super::{Feature, FeatureConfig, FeatureInput, FeatureKind};
use crate::error::ModelResult;
use crate::language::Phrase;
use crate::symbols::Grounding;
use crate::world::{SortCriterion, World};

/// Candidate object is the `index`-th (one-based) element of an ordering,
/// or among the first `index` when `within` is set.
#[derive(Debug, Clone)]
pub struct SortIndexFeature {
    criterion: SortCriterion,
    index: usize,
    within: bool,
    by_type: bool,
    invert: bool,
}

impl SortIndexFeature {
    pub const KIND: &'static str = "sort_index";

    pub fn new(criterion: SortCriterion, index: usize, invert: bool) -> Self {
        Self {
            criterion,
            index,
            within: false,
            by_type: true,
            invert,
        }
    }

    /// Match the first `index` elements instead of exactly the `index`-th.
    pub fn within(mut self, within: bool) -> Self {
        self.within = within;
        self
    }

    /// Order over all objects rather than objects of the candidate's type.
    pub fn across_types(mut self) -> Self {
        self.by_type = false;
        self
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        let index = config.int_param("index")?;
        if index < 1 {
            return Err(crate::error::ModelError::InvalidParameter {
                kind: Self::KIND.to_string(),
                param: "index".to_string(),
                value: index.to_string(),
            });
        }
        Ok(Self {
            criterion: config.parse_param("criterion")?,
            index: index as usize,
            within: config.parse_param_or("within", false)?,
            by_type: config.parse_param_or("by_type", true)?,
            invert: config.invert,
        })
    }
}

impl Feature for SortIndexFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Grounding
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        let object = input.grounding.as_object()?;
        let object_type = self.by_type.then_some(object.object_type.as_ref());
        let ordering = input.world.ordering(self.criterion, object_type)?;
        let position = ordering.iter().position(|id| *id == object.id)?;
        Some(if self.within {
            position < self.index
        } else {
            position + 1 == self.index
        })
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("criterion", self.criterion.as_str())
            .with_param("index", self.index)
            .with_param("within", self.within)
            .with_param("by_type", self.by_type)
    }
}

/// Order-dependent merge: "the second box from the left".
///
/// Applies to an object candidate whose children hold an [`Index`] grounding
/// and a type-naming grounding (object type or abstract container) from two
/// different phrases. Fires when the index phrase precedes the type phrase in
/// the sentence and the candidate is the indexed element of the ordering for
/// that type. The criterion comes from the configuration or, failing that,
/// from a spatial-relation child.
///
/// [`Index`]: crate::symbols::Index
#[derive(Debug, Clone)]
pub struct IndexedMergeFeature {
    criterion: Option<SortCriterion>,
    invert: bool,
}

struct MergeParts<'a> {
    index: Vec<(&'a Phrase, u32)>,
    types: Vec<(&'a Phrase, &'a str)>,
    criterion: Option<SortCriterion>,
}

impl IndexedMergeFeature {
    pub const KIND: &'static str = "indexed_merge";

    pub fn new(criterion: Option<SortCriterion>, invert: bool) -> Self {
        Self { criterion, invert }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        let criterion = if config.has_param("criterion") {
            Some(config.parse_param("criterion")?)
        } else {
            None
        };
        Ok(Self::new(criterion, config.invert))
    }

    fn collect<'a>(&self, input: &FeatureInput<'a>) -> MergeParts<'a> {
        let mut parts = MergeParts {
            index: Vec::new(),
            types: Vec::new(),
            criterion: self.criterion,
        };
        for (phrase, g) in input.child_groundings() {
            match g {
                Grounding::Index(i) => parts.index.push((phrase, i.value)),
                Grounding::ObjectType(t) => parts.types.push((phrase, t.name.as_ref())),
                Grounding::AbstractContainer(a) => {
                    parts.types.push((phrase, a.object_type.as_ref()))
                }
                Grounding::SpatialRelation(s) if parts.criterion.is_none() => {
                    parts.criterion = SortCriterion::from_relation(&s.relation);
                }
                _ => {}
            }
        }
        parts
    }
}

fn same_phrase(a: &Phrase, b: &Phrase) -> bool {
    std::ptr::eq(a, b) || a == b
}

fn nth_is(world: &World, criterion: SortCriterion, object_type: &str, index: u32, id: &str) -> bool {
    world
        .nth(criterion, Some(object_type), index as usize)
        .is_some_and(|o| o.id.as_ref() == id)
}

impl Feature for IndexedMergeFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Grounding
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        let object = input.grounding.as_object()?;
        let parts = self.collect(input);
        let criterion = parts.criterion?;

        let mut applicable = false;
        for (index_phrase, index) in &parts.index {
            for (type_phrase, object_type) in &parts.types {
                if same_phrase(index_phrase, type_phrase) {
                    continue;
                }
                applicable = true;
                if index_phrase.min_word_order() < type_phrase.min_word_order()
                    && nth_is(input.world, criterion, object_type, *index, &object.id)
                {
                    return Some(true);
                }
            }
        }
        applicable.then_some(false)
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_optional_param("criterion", self.criterion.map(|c| c.as_str()))
    }
}
