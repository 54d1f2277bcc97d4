//! Scoring: the log-linear model and the correspondence graph.
//!
//! ```text
//!   LlmX ──► FeatureSet::indices (per outcome) ──► Σ w[i] ──► softmax ──► P(outcome | x)
//!    ▲
//!    └── Factor (phrase, candidate grounding, compatible children)
//! ```
//!
//! [`Llm::pygx`] is the one scoring routine; the trainer calls the same
//! softmax through [`Llm::pygx_indexed`] with cached indices.

mod factor;
mod llm;

use std::sync::Arc;

pub use factor::{Factor, FactorGraph, FactorId, PhraseGrounding};
pub use llm::Llm;

use crate::features::{ChildGroundings, FeatureInput};
use crate::language::Phrase;
use crate::symbols::Grounding;
use crate::types::Outcome;
use crate::world::World;

/// One scoring example: a candidate in its full context, plus the outcomes
/// to normalise over.
#[derive(Debug, Clone)]
pub struct LlmX {
    pub grounding: Arc<Grounding>,
    pub children: Vec<ChildGroundings>,
    pub phrase: Arc<Phrase>,
    pub world: Arc<World>,
    pub context: Option<Arc<Grounding>>,
    pub outcome_domain: Vec<Outcome>,
}

impl LlmX {
    /// Binary-domain example without context.
    pub fn new(
        grounding: Arc<Grounding>,
        children: Vec<ChildGroundings>,
        phrase: Arc<Phrase>,
        world: Arc<World>,
    ) -> Self {
        Self {
            grounding,
            children,
            phrase,
            world,
            context: None,
            outcome_domain: Outcome::BINARY.to_vec(),
        }
    }

    pub fn with_domain(mut self, outcome_domain: Vec<Outcome>) -> Self {
        self.outcome_domain = outcome_domain;
        self
    }

    pub fn with_context(mut self, context: Option<Arc<Grounding>>) -> Self {
        self.context = context;
        self
    }

    /// Predicate input for one outcome.
    pub fn input(&self, outcome: Outcome) -> FeatureInput<'_> {
        FeatureInput::new(
            outcome,
            &self.grounding,
            &self.children,
            &self.phrase,
            &self.world,
        )
        .with_context(self.context.as_deref())
    }
}
