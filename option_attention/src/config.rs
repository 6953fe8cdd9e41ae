//! Unified option-critic configuration.
//!
//! A single configuration type carries the network dimensions, the direction
//! clustering settings, the resume/log locations and the loss coefficients.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OptionCriticError, Result};

/// Configuration for the attention option-critic network.
///
/// # Example
///
/// ```ignore
/// let config = OptionCriticConfig::new()
///     .with_nb_states(16)
///     .with_sf_layers(vec![32])
///     .with_nb_options(4)
///     .with_action_size(4)
///     .with_use_clustering(true)
///     .with_logdir("./runs/attention");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionCriticConfig {
    // === Network dimensions ===
    /// Observation size
    pub nb_states: usize,
    /// Successor feature layer sizes; the last entry is the embedding size D
    pub sf_layers: Vec<usize>,
    /// Number of direction clusters (options) K
    pub nb_options: usize,
    /// Number of primitive actions A
    pub action_size: usize,

    // === Direction clustering ===
    /// Maximum number of buffered centers in the online accumulator
    pub max_clusters: usize,
    /// Whether the global replica manages the direction clusters
    pub use_clustering: bool,

    // === Persistence ===
    /// Resume from the latest checkpoint in `load_from`
    pub resume: bool,
    /// Run directory to resume from (checkpoint state lives in `<load_from>/models`)
    pub load_from: PathBuf,
    /// Log directory (cluster snapshots live in `<logdir>/cluster_models`)
    pub logdir: PathBuf,

    // === Loss coefficients ===
    /// Successor feature loss coefficient
    pub sf_coef: f32,
    /// Mixed critic loss coefficient
    pub eigen_critic_coef: f32,
    /// Entropy regularization coefficient
    pub entropy_coef: f32,
}

impl Default for OptionCriticConfig {
    fn default() -> Self {
        Self {
            nb_states: 169,
            sf_layers: vec![169],
            nb_options: 8,
            action_size: 4,

            max_clusters: 100,
            use_clustering: true,

            resume: false,
            load_from: PathBuf::new(),
            logdir: PathBuf::from("./logs"),

            sf_coef: 1.0,
            eigen_critic_coef: 1.0,
            entropy_coef: 0.01,
        }
    }
}

impl OptionCriticConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Embedding size D (last successor feature layer).
    pub fn goal_embedding_size(&self) -> usize {
        self.sf_layers.last().copied().unwrap_or(0)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Check that the configuration describes a buildable network.
    pub fn validate(&self) -> Result<()> {
        if self.sf_layers.is_empty() || self.goal_embedding_size() == 0 {
            return Err(OptionCriticError::Config(
                "sf_layers must end with a non-zero embedding size".into(),
            ));
        }
        if self.nb_states == 0 {
            return Err(OptionCriticError::Config("nb_states must be > 0".into()));
        }
        if self.nb_options == 0 {
            return Err(OptionCriticError::Config("nb_options must be > 0".into()));
        }
        if self.action_size == 0 {
            return Err(OptionCriticError::Config("action_size must be > 0".into()));
        }
        if self.use_clustering && self.max_clusters < self.nb_options {
            return Err(OptionCriticError::Config(format!(
                "max_clusters ({}) must be >= nb_options ({})",
                self.max_clusters, self.nb_options
            )));
        }
        for (name, coef) in [
            ("sf_coef", self.sf_coef),
            ("eigen_critic_coef", self.eigen_critic_coef),
            ("entropy_coef", self.entropy_coef),
        ] {
            if !coef.is_finite() || coef < 0.0 {
                return Err(OptionCriticError::Config(format!(
                    "{} must be finite and non-negative, got {}",
                    name, coef
                )));
            }
        }
        Ok(())
    }

    // === Builder methods for network dimensions ===

    /// Set observation size.
    pub fn with_nb_states(mut self, nb_states: usize) -> Self {
        self.nb_states = nb_states;
        self
    }

    /// Set successor feature layer sizes.
    pub fn with_sf_layers(mut self, sf_layers: Vec<usize>) -> Self {
        self.sf_layers = sf_layers;
        self
    }

    /// Set number of options (direction clusters).
    pub fn with_nb_options(mut self, nb_options: usize) -> Self {
        self.nb_options = nb_options;
        self
    }

    /// Set number of primitive actions.
    pub fn with_action_size(mut self, action_size: usize) -> Self {
        self.action_size = action_size;
        self
    }

    // === Builder methods for clustering ===

    /// Set accumulator capacity.
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Enable or disable cluster management.
    pub fn with_use_clustering(mut self, use_clustering: bool) -> Self {
        self.use_clustering = use_clustering;
        self
    }

    // === Builder methods for persistence ===

    /// Resume from `load_from`.
    pub fn with_resume(mut self, load_from: impl Into<PathBuf>) -> Self {
        self.resume = true;
        self.load_from = load_from.into();
        self
    }

    /// Set the log directory.
    pub fn with_logdir(mut self, logdir: impl Into<PathBuf>) -> Self {
        self.logdir = logdir.into();
        self
    }

    // === Builder methods for loss coefficients ===

    /// Set successor feature loss coefficient.
    pub fn with_sf_coef(mut self, coef: f32) -> Self {
        self.sf_coef = coef;
        self
    }

    /// Set mixed critic loss coefficient.
    pub fn with_eigen_critic_coef(mut self, coef: f32) -> Self {
        self.eigen_critic_coef = coef;
        self
    }

    /// Set entropy coefficient.
    pub fn with_entropy_coef(mut self, coef: f32) -> Self {
        self.entropy_coef = coef;
        self
    }
}
