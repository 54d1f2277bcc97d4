//! Feature predicates and the active-feature indexer.
//!
//! A feature is a pure boolean predicate over one scoring context:
//!
//! ```text
//! (outcome, grounding, children, phrase, world, context?) -> bool
//! ```
//!
//! Each one contributes a single weighted term to the log-linear score. There
//! are hundreds of instances in a trained model but only a handful of kinds,
//! so kinds are pluggable: a [`FeatureRegistry`] maps a kind name to a factory
//! that builds an instance from a typed [`FeatureConfig`].
//!
//! # Kinds
//!
//! | Kind                | Class     | Fires when                                        |
//! |---------------------|-----------|---------------------------------------------------|
//! | `word`              | syntax    | the phrase holds a given word (and POS)           |
//! | `phrase_type`       | syntax    | the phrase has a given tag                        |
//! | `num_words`         | syntax    | word count compares against a literal             |
//! | `num_child_phrases` | syntax    | child count compares against a literal            |
//! | `outcome`           | grounding | the outcome being scored equals a literal         |
//! | `class_match`       | grounding | the candidate's class tag equals a literal        |
//! | `object_type`       | grounding | the candidate names a given object type           |
//! | `property_match`    | grounding | a named property equals a literal                 |
//! | `container_size`    | grounding | a container's size compares against a literal     |
//! | `child_match`       | grounding | a child grounding relates to the candidate        |
//! | `child_class`       | grounding | some child grounding has a given class            |
//! | `sort_index`        | grounding | candidate is the k-th object of a world ordering  |
//! | `indexed_merge`     | grounding | "the second block from the left" style merges     |
//! | `shape`             | grounding | a container's objects form a row/column/tower/... |
//! | `conjunction`       | either    | every part fires                                  |
//!
//! # Syntax vs grounding
//!
//! Syntax features read only the phrase, so the [`FeatureSet`] evaluates them
//! once per phrase and reuses the result for every outcome and candidate.
//! Grounding features are re-evaluated for each (outcome, candidate) pair.
//!
//! # Misses are not errors
//!
//! A predicate that does not apply (wrong grounding variant, missing sibling,
//! no such ordering) reports `None` from [`Feature::decide`], which
//! [`Feature::value`] turns into `false` regardless of `invert`.

mod children;
mod config;
mod conjunction;
mod feature_set;
mod ordering;
mod registry;
mod shape;
mod symbol;
mod syntax;
mod templates;

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;
use std::sync::Arc;

use crate::language::Phrase;
use crate::symbols::Grounding;
use crate::types::Outcome;
use crate::world::World;

pub use children::{ChildClassFeature, ChildMatchFeature, ChildRelation};
pub use config::{FeatureConfig, FeatureParams, ParamValue};
pub use conjunction::ConjunctionFeature;
pub use feature_set::{FeatureSet, LeafCache};
pub use ordering::{IndexedMergeFeature, SortIndexFeature};
pub use registry::{FeatureFactory, FeatureRegistry};
pub use shape::{Shape, ShapeFeature, ShapeTolerances};
pub use symbol::{
    ClassMatchFeature, ContainerSizeFeature, ObjectTypeFeature, OutcomeFeature,
    PropertyMatchFeature,
};
pub use syntax::{NumChildPhrasesFeature, NumWordsFeature, PhraseTypeFeature, WordFeature};
pub use templates::FeatureTemplates;

/// What a feature depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Reads only the phrase
    Syntax,
    /// Reads the outcome, candidate, children, world or context
    Grounding,
}

/// Per-call mask of which feature kinds to (re)evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureKinds(u8);

impl FeatureKinds {
    pub const NONE: FeatureKinds = FeatureKinds(0);
    pub const SYNTAX: FeatureKinds = FeatureKinds(0b01);
    pub const GROUNDING: FeatureKinds = FeatureKinds(0b10);
    pub const ALL: FeatureKinds = FeatureKinds(0b11);

    pub fn contains(self, kind: FeatureKind) -> bool {
        let bit = match kind {
            FeatureKind::Syntax => Self::SYNTAX.0,
            FeatureKind::Grounding => Self::GROUNDING.0,
        };
        self.0 & bit != 0
    }
}

impl BitOr for FeatureKinds {
    type Output = FeatureKinds;

    fn bitor(self, rhs: Self) -> Self::Output {
        FeatureKinds(self.0 | rhs.0)
    }
}

impl From<FeatureKind> for FeatureKinds {
    fn from(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Syntax => FeatureKinds::SYNTAX,
            FeatureKind::Grounding => FeatureKinds::GROUNDING,
        }
    }
}

/// Accepted groundings of one child phrase.
///
/// Only groundings whose own factor resolved to `Compatible` belong here.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildGroundings {
    pub phrase: Arc<Phrase>,
    pub groundings: Vec<Arc<Grounding>>,
}

impl ChildGroundings {
    pub fn new(phrase: Arc<Phrase>, groundings: Vec<Arc<Grounding>>) -> Self {
        Self { phrase, groundings }
    }
}

/// Everything a predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInput<'a> {
    pub outcome: Outcome,
    pub grounding: &'a Grounding,
    pub children: &'a [ChildGroundings],
    pub phrase: &'a Phrase,
    pub world: &'a World,
    pub context: Option<&'a Grounding>,
}

impl<'a> FeatureInput<'a> {
    /// Context-free input; most predicates never look at `context`.
    pub fn new(
        outcome: Outcome,
        grounding: &'a Grounding,
        children: &'a [ChildGroundings],
        phrase: &'a Phrase,
        world: &'a World,
    ) -> Self {
        Self {
            outcome,
            grounding,
            children,
            phrase,
            world,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<&'a Grounding>) -> Self {
        self.context = context;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Flattened (child phrase, child grounding) pairs.
    pub fn child_groundings(self) -> impl Iterator<Item = (&'a Phrase, &'a Grounding)> + 'a {
        self.children.iter().flat_map(|child| {
            child
                .groundings
                .iter()
                .map(move |g| (child.phrase.as_ref(), g.as_ref()))
        })
    }
}

/// A pure boolean predicate with an invert flag.
///
/// Implementors provide [`decide`](Feature::decide); the provided
/// [`value`](Feature::value) applies `invert` and maps inapplicable inputs to
/// `false`. Instances are immutable and shared across threads.
pub trait Feature: Send + Sync + fmt::Debug {
    /// Registered kind name (`"class_match"`, `"shape"`, ...)
    fn name(&self) -> &'static str;

    fn kind(&self) -> FeatureKind;

    fn invert(&self) -> bool;

    /// The un-inverted decision, or `None` when the predicate does not apply.
    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool>;

    /// Final boolean contribution.
    fn value(&self, input: &FeatureInput<'_>) -> bool {
        match self.decide(input) {
            Some(decision) => decision != self.invert(),
            None => false,
        }
    }

    /// Configuration that rebuilds this instance through the registry.
    fn config(&self) -> FeatureConfig;

    /// Sub-features, for composites.
    fn parts(&self) -> Option<&[Arc<dyn Feature>]> {
        None
    }

    /// Stable identity used for leaf deduplication.
    fn signature(&self) -> String {
        self.config().signature()
    }
}

/// Numeric comparison used by count-based predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    #[default]
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Lt => "lt",
            Comparison::Gt => "gt",
            Comparison::Le => "le",
            Comparison::Ge => "ge",
        }
    }

    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" | "=" | "==" => Ok(Comparison::Eq),
            "lt" | "<" => Ok(Comparison::Lt),
            "gt" | ">" => Ok(Comparison::Gt),
            "le" | "<=" => Ok(Comparison::Le),
            "ge" | ">=" => Ok(Comparison::Ge),
            other => Err(format!("unknown comparison '{}'", other)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small fixtures shared by the feature tests.

    use super::*;
    use crate::language::{PhraseKind, Word};
    use crate::symbols::Object;
    use crate::types::Position;

    pub fn block_world() -> World {
        World::new(vec![
            Object::new("b0", "box", Position::new(1.0, 0.5, 0.0)).with_color("red"),
            Object::new("b1", "box", Position::new(1.0, -0.5, 0.0)).with_color("blue"),
            Object::new("s0", "ball", Position::new(2.0, 0.0, 0.0)),
        ])
    }

    pub fn noun_phrase(words: &[(&str, &str)]) -> Phrase {
        let words = words
            .iter()
            .enumerate()
            .map(|(i, (pos, text))| Word::new(*pos, *text, i as u32))
            .collect();
        Phrase::leaf(PhraseKind::Np, words)
    }

    pub fn object(world: &World, id: &str) -> Grounding {
        Grounding::Object(world.object(id).cloned().expect("fixture object"))
    }
}
