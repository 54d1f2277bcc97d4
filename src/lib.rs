//! grounder - Natural-language grounding with log-linear factor graphs
//!
//! Maps the phrases of a parsed instruction ("pick up the box near the
//! ball") onto the objects, regions and symbols of a world snapshot.
//! Every (phrase, candidate grounding) pair is a factor scored by a
//! log-linear model over boolean feature predicates; weights are learned
//! from annotated sentences by regularized maximum likelihood.
//!
//! # Architecture
//!
//! ```text
//! Corpus (JSON) → SearchSpace → Enumerator → FactorGraph → resolve → best groundings
//!      ↓              ↓             ↓             ↓
//!   worlds +      candidate     post-order     Llm::pygx
//!   phrase trees  groundings    factors        (features · weights)
//!
//! Annotated examples → Trainer (sharded, rayon) → L-BFGS → weights → model.xml
//! ```
//!
//! # Performance Strategies
//!
//! - Syntax-only predicates evaluated once per phrase, not per candidate
//! - Shared leaf predicates deduplicated across composite features
//! - Active feature indices precomputed once per training run
//! - World orderings precomputed at construction
//! - Training shards evaluated in parallel with private accumulators

pub mod config;
pub mod corpus;
pub mod dcg;
pub mod error;
pub mod features;
pub mod language;
pub mod model;
pub mod persist;
pub mod symbols;
pub mod training;
pub mod types;
pub mod world;

// Re-export core types
pub use types::{Axis, Outcome, Position};

pub use config::TrainingConfig;
pub use corpus::{Corpus, Sentence};
pub use dcg::{Enumerator, SearchSpace};
pub use error::{ModelError, ModelResult, TrainingError};
pub use features::{Feature, FeatureConfig, FeatureKind, FeatureKinds, FeatureRegistry, FeatureSet};
pub use language::{Phrase, PhraseKind, Word};
pub use model::{Factor, FactorGraph, FactorId, Llm, LlmX, PhraseGrounding};
pub use symbols::{Grounding, Object};
pub use training::{EvalMetrics, Trainer, TrainingReport};
pub use world::{SortCriterion, World};
