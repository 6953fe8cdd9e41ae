//! Model checkpointing for option-critic training.
//!
//! Network records are written as `model-<episode>.bin` with burn's
//! `BinFileRecorder`, and the `checkpoint` state file is rewritten after every
//! save so that a resumed run can recover the episode (and with it the matching
//! direction-cluster snapshot).

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::state::{episode_token, CheckpointState};

/// Prefix of model checkpoint files.
pub const MODEL_PREFIX: &str = "model";

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints (`<logdir>/models`).
    pub checkpoint_dir: PathBuf,
    /// Episodes between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./logs/models"),
            save_interval: 1000,
            keep_last_n: 5,
        }
    }
}

impl CheckpointerConfig {
    /// Create a new config with specified checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Models directory under a log directory.
    pub fn for_logdir(logdir: impl AsRef<Path>) -> Self {
        Self::new(logdir.as_ref().join("models"))
    }

    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Burn recorder error.
    #[error("Recorder error: {0}")]
    Recorder(String),
    /// No checkpoint state in the directory.
    #[error("No checkpoints found")]
    NoCheckpoints,
    /// The state file exists but cannot be interpreted.
    #[error("Invalid checkpoint state: {0}")]
    InvalidState(String),
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Path to the checkpoint file.
    pub path: PathBuf,
    /// Episode at which the checkpoint was saved.
    pub episode: usize,
}

impl CheckpointInfo {
    fn from_path(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if !name.starts_with(MODEL_PREFIX) || !name.ends_with(".bin") {
            return None;
        }
        let episode = episode_token(&path)?.parse().ok()?;
        Some(Self { path, episode })
    }
}

/// Saves network records and keeps the checkpoint state file current.
pub struct Checkpointer {
    config: CheckpointerConfig,
    checkpoint_history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist. Checkpoints
    /// already on disk are adopted into the retention history.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        let mut checkpointer = Self {
            config,
            checkpoint_history: Vec::new(),
        };
        checkpointer.checkpoint_history = checkpointer.list_checkpoints()?;
        Ok(checkpointer)
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Check if it's time to save a checkpoint.
    pub fn should_save(&self, episode: usize) -> bool {
        self.config.save_interval > 0 && episode > 0 && episode % self.config.save_interval == 0
    }

    /// `<checkpoint_dir>/model-<episode>.bin`
    pub fn checkpoint_path(&self, episode: usize) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("{}-{}.bin", MODEL_PREFIX, episode))
    }

    /// Save a model checkpoint and update the state file.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        episode: usize,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.checkpoint_path(episode);

        // The recorder appends its own extension
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.with_extension(""), &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        self.checkpoint_history.retain(|c| c.episode != episode);
        self.checkpoint_history.push(CheckpointInfo {
            path: path.clone(),
            episode,
        });

        self.cleanup_old_checkpoints();
        self.write_state()?;

        Ok(path)
    }

    fn write_state(&self) -> Result<(), CheckpointError> {
        let latest = self
            .checkpoint_history
            .last()
            .ok_or(CheckpointError::NoCheckpoints)?;
        let state = CheckpointState {
            model_checkpoint_path: latest.path.clone(),
            all_model_checkpoint_paths: self
                .checkpoint_history
                .iter()
                .map(|c| c.path.clone())
                .collect(),
        };
        state.write(&self.config.checkpoint_dir)
    }

    /// Load a model from a checkpoint file into a template.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(path.with_extension(""), &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the checkpoint named by the state file.
    ///
    /// Returns the model and the episode it was saved at.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        device: &B::Device,
    ) -> Result<(M, usize), CheckpointError> {
        let latest = self.find_latest_checkpoint()?;
        let model = self.load(model_template, &latest.path, device)?;
        Ok((model, latest.episode))
    }

    /// Latest checkpoint according to the state file.
    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        let state = CheckpointState::read(&self.config.checkpoint_dir)?;
        let path = state.model_checkpoint_path;
        let episode = episode_token(&path)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                CheckpointError::InvalidState(format!("no episode in {}", path.display()))
            })?;
        Ok(CheckpointInfo { path, episode })
    }

    /// List all model checkpoints in the directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| CheckpointInfo::from_path(e.path()))
            .collect();

        checkpoints.sort_by_key(|c| c.episode);
        Ok(checkpoints)
    }

    /// Remove old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&mut self) {
        if self.config.keep_last_n == 0 {
            return;
        }

        while self.checkpoint_history.len() > self.config.keep_last_n {
            let old = self.checkpoint_history.remove(0);
            if let Err(e) = fs::remove_file(&old.path) {
                log::warn!("Failed to remove old checkpoint {}: {}", old.path.display(), e);
            }
        }
    }
}
