//! Weight learning for the log-linear grounding model.
//!
//! Training maximises the L2-regularized conditional log-likelihood of the
//! labelled (outcome, example) pairs:
//!
//! ```text
//! O(w)   = Σ_e log P(y_e | x_e; w)  -  λ/2 ‖w‖²
//! ∂O/∂wᵢ = Σ_e [ fᵢ(y_e, x_e)  -  Σ_c P(c | x_e) fᵢ(c, x_e) ]  -  λ wᵢ
//!            empirical count       expected count
//! ```
//!
//! ## Pieces
//!
//! | Module     | Role                                                         |
//! |------------|--------------------------------------------------------------|
//! | `trainer`  | Sharding, index precomputation, parallel objective/gradient  |
//! | `lbfgs`    | Quasi-Newton minimizer driven by a value+gradient callback   |
//! | `metrics`  | Accuracy, precision/recall/F1, log-likelihood on held-out data |
//! | `progress` | Live sparkline of the objective in the terminal              |
//!
//! ## Parallelism
//!
//! Examples are split into shards by world, one shard per worker thread.
//! Each worker writes only to its own accumulator; partial sums are added on
//! the calling thread once every worker has joined. Weights are copied into
//! each shard's model replica between evaluations, never shared mutably.
//!
//! ## Usage
//!
//! ```bash
//! grounder train --corpus corpus.json --model model.xml --threads 8 --lambda 0.01
//! grounder evaluate --corpus heldout.json --model model.xml
//! ```

pub mod lbfgs;
pub mod metrics;
pub mod progress;
pub mod trainer;

pub use lbfgs::{IterationReport, LbfgsConfig, LbfgsResult, Objective, Termination, minimize};
pub use metrics::{CaseMetrics, EvalMetrics};
pub use progress::LiveProgress;
pub use trainer::{IterationStats, Trainer, TrainingReport};
