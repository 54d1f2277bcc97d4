//! Error types for model loading and training.
//!
//! Predicate misses are not errors: a feature that cannot apply simply does
//! not fire. What lands here is configuration that cannot be used at all
//! (bad model files, unknown feature kinds) and training runs that cannot
//! produce a usable model.

use thiserror::Error;

/// Errors raised while building, loading, or saving a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A model refers to a feature kind nobody registered
    #[error("Unknown feature kind {kind:?}")]
    UnknownFeatureKind { kind: String },

    /// A feature configuration omits a required parameter
    #[error("Feature {kind:?} is missing required parameter \"{param}\"")]
    MissingParameter { kind: String, param: String },

    /// A feature parameter is present but cannot be interpreted
    #[error("Feature {kind:?} parameter \"{param}\" has invalid value {value:?}")]
    InvalidParameter {
        kind: String,
        param: String,
        value: String,
    },

    /// Weight vector and feature set disagree in length
    #[error("Weight vector has {weights} entries but the feature set has {features} features")]
    WeightCountMismatch { weights: usize, features: usize },

    /// A weight is NaN or infinite
    #[error("Weight {index} is not finite ({value})")]
    NonFiniteWeight { index: usize, value: f64 },

    /// The model document could not be parsed
    #[error("Malformed model document: {message}")]
    Malformed { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the trainer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("Training corpus is empty")]
    EmptyCorpus,

    #[error("Example {index} has an empty outcome domain")]
    EmptyOutcomeDomain { index: usize },

    #[error("Example {index} is labeled {label} which is outside its outcome domain")]
    LabelOutsideDomain { index: usize, label: String },

    #[error("Invalid trainer configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The optimizer produced NaN/Inf values
    #[error("Optimizer diverged at iteration {iteration}: {reason}")]
    Diverged { iteration: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ModelError::WeightCountMismatch {
            weights: 3,
            features: 4,
        };
        assert_eq!(
            err.to_string(),
            "Weight vector has 3 entries but the feature set has 4 features"
        );

        let err = ModelError::UnknownFeatureKind {
            kind: "telepathy".into(),
        };
        assert!(err.to_string().contains("telepathy"));
    }
}
