//! Predicates over the outcome and the candidate grounding itself.

use std::sync::Arc;

use super::{Comparison, Feature, FeatureConfig, FeatureInput, FeatureKind};
use crate::error::ModelResult;
use crate::symbols::Grounding;
use crate::types::Outcome;

/// Fires when the outcome being scored equals `outcome`.
///
/// On its own this is a per-outcome bias; inside a conjunction it makes any
/// other predicate outcome-specific.
#[derive(Debug, Clone)]
pub struct OutcomeFeature {
    outcome: Outcome,
    invert: bool,
}

impl OutcomeFeature {
    pub const KIND: &'static str = "outcome";

    pub fn new(outcome: Outcome, invert: bool) -> Self {
        Self { outcome, invert }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(config.parse_param("outcome")?, config.invert))
    }
}

impl Feature for OutcomeFeature {
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
        Some(input.outcome == self.outcome)
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("outcome", self.outcome.as_str())
    }
}

/// Fires when the candidate's class tag equals a literal.
#[derive(Debug, Clone)]
pub struct ClassMatchFeature {
    class: Arc<str>,
    invert: bool,
}

impl ClassMatchFeature {
    pub const KIND: &'static str = "class_match";

    pub fn new(class: &str, invert: bool) -> Self {
        Self {
            class: Arc::from(class),
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(&config.str_param("class")?, config.invert))
    }
}

impl Feature for ClassMatchFeature {
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
        Some(input.grounding.class_name() == self.class.as_ref())
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("class", self.class.as_ref())
    }
}

/// Fires when the candidate names object type `object_type`.
///
/// Containers match when every member has that type. Candidates that name no
/// type at all (regions, numbers, ...) are inapplicable.
#[derive(Debug, Clone)]
pub struct ObjectTypeFeature {
    object_type: Arc<str>,
    invert: bool,
}

impl ObjectTypeFeature {
    pub const KIND: &'static str = "object_type";

    pub fn new(object_type: &str, invert: bool) -> Self {
        Self {
            object_type: Arc::from(object_type),
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(&config.str_param("type")?, config.invert))
    }
}

impl Feature for ObjectTypeFeature {
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
        match input.grounding {
            Grounding::Container(c) if !c.objects.is_empty() => Some(
                c.objects
                    .iter()
                    .all(|o| o.object_type == self.object_type),
            ),
            g => g.object_type().map(|t| t == self.object_type.as_ref()),
        }
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("type", self.object_type.as_ref())
    }
}

/// Generic property test: `properties()[key] == literal`, optionally
/// restricted to one grounding class.
#[derive(Debug, Clone)]
pub struct PropertyMatchFeature {
    key: Arc<str>,
    literal: Arc<str>,
    class: Option<Arc<str>>,
    invert: bool,
}

impl PropertyMatchFeature {
    pub const KIND: &'static str = "property_match";

    pub fn new(key: &str, literal: &str, class: Option<&str>, invert: bool) -> Self {
        Self {
            key: Arc::from(key),
            literal: Arc::from(literal),
            class: class.map(Arc::from),
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        let key = config.str_param("key")?;
        let literal = config.str_param("value")?;
        let class = config.opt_str_param("class");
        Ok(Self::new(&key, &literal, class.as_deref(), config.invert))
    }
}

impl Feature for PropertyMatchFeature {
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
        if let Some(class) = &self.class {
            if input.grounding.class_name() != class.as_ref() {
                return None;
            }
        }
        let value = input.grounding.property(&self.key)?;
        Some(value.matches(&self.literal))
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("key", self.key.as_ref())
            .with_param("value", self.literal.as_ref())
            .with_optional_param("class", self.class.as_deref())
    }
}

/// Size of a container (or the number of an abstract container) compared
/// against a literal.
#[derive(Debug, Clone)]
pub struct ContainerSizeFeature {
    count: i64,
    comparison: Comparison,
    invert: bool,
}

impl ContainerSizeFeature {
    pub const KIND: &'static str = "container_size";

    pub fn new(count: i64, comparison: Comparison, invert: bool) -> Self {
        Self {
            count,
            comparison,
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(
            config.int_param("count")?,
            config.parse_param_or("cmp", Comparison::Eq)?,
            config.invert,
        ))
    }
}

impl Feature for ContainerSizeFeature {
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
        let size = match input.grounding {
            Grounding::Container(c) => c.objects.len() as i64,
            Grounding::AbstractContainer(a) => a.number as i64,
            _ => return None,
        };
        Some(self.comparison.apply(size, self.count))
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("count", self.count)
            .with_param("cmp", self.comparison.as_str())
    }
}
