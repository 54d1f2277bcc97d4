//! Training configuration from grounder.toml.
//!
//! ## Example
//!
//! ```toml
//! threads = 8
//! regularization = 0.01
//! max-iterations = 200
//! epsilon = 1e-5
//! history = 6
//! holdout = 0.2
//! seed = 42
//! ```
//!
//! Every key is optional; missing keys keep their defaults. Command-line
//! flags are applied on top of whatever was loaded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::TrainingError;

/// File name searched for in the working directory and its parents.
pub const CONFIG_FILE: &str = "grounder.toml";

/// Trainer and evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Source file for this config (for display).
    pub source: Option<PathBuf>,

    /// Worker threads, one model replica each.
    pub threads: usize,

    /// L2 penalty λ.
    pub regularization: f64,

    pub max_iterations: usize,

    /// Relative gradient-norm convergence threshold.
    pub epsilon: f64,

    /// L-BFGS memory (correction pairs kept).
    pub history: usize,

    /// Fraction of sentences held out for evaluation.
    pub holdout: f64,

    /// Seed for the holdout shuffle.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            source: None,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            regularization: 0.01,
            max_iterations: 100,
            epsilon: 1e-5,
            history: 6,
            holdout: 0.0,
            seed: 0,
        }
    }
}

/// Raw config as deserialized from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    threads: Option<usize>,
    regularization: Option<f64>,
    max_iterations: Option<usize>,
    epsilon: Option<f64>,
    history: Option<usize>,
    holdout: Option<f64>,
    seed: Option<u64>,
}

impl TrainingConfig {
    /// Load configuration.
    ///
    /// Search order:
    /// 1. `explicit`, when given (errors are fatal)
    /// 2. grounder.toml in `directory`
    /// 3. Walk up to the nearest grounder.toml in a parent directory
    /// 4. Defaults
    ///
    /// A discovered file that fails to parse is skipped with a warning.
    pub fn load(explicit: Option<&Path>, directory: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let mut current = Some(directory);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.exists() {
                match Self::load_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(err) => warn!(path = %candidate.display(), "ignoring config: {err:#}"),
                }
            }
            current = dir.parent();
        }

        debug!("no {CONFIG_FILE} found, using defaults");
        Ok(Self::default())
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        let config = Self::from_raw(raw, path.to_path_buf());
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn from_raw(raw: RawConfig, source: PathBuf) -> Self {
        let defaults = Self::default();
        Self {
            source: Some(source),
            threads: raw.threads.unwrap_or(defaults.threads),
            regularization: raw.regularization.unwrap_or(defaults.regularization),
            max_iterations: raw.max_iterations.unwrap_or(defaults.max_iterations),
            epsilon: raw.epsilon.unwrap_or(defaults.epsilon),
            history: raw.history.unwrap_or(defaults.history),
            holdout: raw.holdout.unwrap_or(defaults.holdout),
            seed: raw.seed.unwrap_or(defaults.seed),
        }
    }

    /// Reject settings the trainer cannot run with.
    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |reason: String| Err(TrainingError::InvalidConfig { reason });
        if self.threads == 0 {
            return invalid("threads must be at least 1".into());
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return invalid(format!(
                "regularization must be a finite non-negative number, got {}",
                self.regularization
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return invalid(format!("epsilon must be positive, got {}", self.epsilon));
        }
        if self.history == 0 {
            return invalid("history must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.holdout) {
            return invalid(format!("holdout must be in [0, 1), got {}", self.holdout));
        }
        Ok(())
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();
        match self.source {
            Some(ref source) => lines.push(format!("   Config: {}", source.display())),
            None => lines.push("   Config: (defaults)".to_string()),
        }
        lines.push(format!(
            "   Threads: {}  λ: {}  Iterations: {}  ε: {:e}  History: {}",
            self.threads, self.regularization, self.max_iterations, self.epsilon, self.history
        ));
        if self.holdout > 0.0 {
            lines.push(format!("   Holdout: {:.0}% (seed {})", self.holdout * 100.0, self.seed));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert!(config.threads >= 1);
        assert_eq!(config.regularization, 0.01);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.history, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_walks_up_to_parent() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE),
            "regularization = 0.5\nmax-iterations = 7\n",
        )
        .unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = TrainingConfig::load(None, &nested).unwrap();
        assert_eq!(config.regularization, 0.5);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.epsilon, 1e-5);
        assert_eq!(config.source, Some(root.path().join(CONFIG_FILE)));
    }

    #[test]
    fn test_explicit_path_errors_are_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "threads = 0\n").unwrap();
        assert!(TrainingConfig::load(Some(&path), dir.path()).is_err());

        std::fs::write(&path, "unknown-key = 1\n").unwrap();
        assert!(TrainingConfig::load(Some(&path), dir.path()).is_err());

        assert!(TrainingConfig::load(Some(&dir.path().join("missing.toml")), dir.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_lambda() {
        let config = TrainingConfig {
            regularization: -1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrainingError::InvalidConfig { .. })
        ));
    }
}
