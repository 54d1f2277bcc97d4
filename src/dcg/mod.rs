//! Candidate enumeration and graph construction.
//!
//! # Pipeline
//!
//! ```text
//! World ──► SearchSpace::from_world ──► candidates
//!                                          │
//! Phrase tree ──► post-order walk ─────────┴──► one Factor per (phrase, candidate)
//!                                                    │
//!                        children = factors of the child phrases (by index)
//! ```
//!
//! The walk is bottom-up, so the factor arena is already in dependency
//! order. No pruning: every candidate of a child phrase is linked, and only
//! those that resolve as compatible are visible to the parent's features.
//!
//! The same walk turns an annotated sentence into labelled training examples.

mod enumerator;
mod search_space;

pub use enumerator::Enumerator;
pub use search_space::{MAX_ORDINAL, RELATIONS, SearchSpace};
