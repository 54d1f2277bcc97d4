//! Composite feature: every part fires.

use std::sync::Arc;

use super::{Feature, FeatureConfig, FeatureInput, FeatureKind, FeatureRegistry};
use crate::error::{ModelError, ModelResult};

/// Logical AND over part features (each with its own `invert`).
///
/// This is how templates make a grounding predicate specific to an outcome
/// and a word: `outcome=compatible ∧ word=left ∧ class_match=region`.
#[derive(Debug, Clone)]
pub struct ConjunctionFeature {
    parts: Vec<Arc<dyn Feature>>,
    invert: bool,
}

impl ConjunctionFeature {
    pub const KIND: &'static str = "conjunction";

    pub fn new(parts: Vec<Arc<dyn Feature>>, invert: bool) -> Self {
        Self { parts, invert }
    }

    pub fn from_config(config: &FeatureConfig, registry: &FeatureRegistry) -> ModelResult<Self> {
        if config.parts.is_empty() {
            return Err(ModelError::MissingParameter {
                kind: Self::KIND.to_string(),
                param: "parts".to_string(),
            });
        }
        let parts = config
            .parts
            .iter()
            .map(|part| registry.build(part))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(Self::new(parts, config.invert))
    }
}

impl Feature for ConjunctionFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        if self.parts.iter().all(|p| p.kind() == FeatureKind::Syntax) {
            FeatureKind::Syntax
        } else {
            FeatureKind::Grounding
        }
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        Some(self.parts.iter().all(|p| p.value(input)))
    }

    fn config(&self) -> FeatureConfig {
        self.parts.iter().fold(
            FeatureConfig::new(Self::KIND).inverted(self.invert),
            |config, part| config.with_part(part.config()),
        )
    }

    fn parts(&self) -> Option<&[Arc<dyn Feature>]> {
        Some(&self.parts)
    }
}
