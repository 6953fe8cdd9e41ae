//! Checkpoint state file.
//!
//! A `checkpoint` file in the models directory names the most recent model
//! checkpoint and the ones still on disk:
//!
//! ```text
//! model_checkpoint_path: "model-1200.bin"
//! all_model_checkpoint_paths: "model-1100.bin"
//! all_model_checkpoint_paths: "model-1200.bin"
//! ```
//!
//! Other keys, such as `all_model_checkpoint_timestamps: 1546300800.1` or
//! `last_preserved_timestamp`, are skipped and may be unquoted.
//!
//! The training episode of a checkpoint is encoded in its file name:
//! `model-<episode>.<ext>`.

use std::fs;
use std::path::{Path, PathBuf};

use super::checkpointer::CheckpointError;

/// Name of the state file inside the models directory.
pub const STATE_FILE: &str = "checkpoint";

const LATEST_KEY: &str = "model_checkpoint_path";
const ALL_KEY: &str = "all_model_checkpoint_paths";

/// Parsed checkpoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointState {
    /// Most recent checkpoint.
    pub model_checkpoint_path: PathBuf,
    /// Every retained checkpoint, oldest first.
    pub all_model_checkpoint_paths: Vec<PathBuf>,
}

impl CheckpointState {
    pub fn new(latest: impl Into<PathBuf>) -> Self {
        let latest = latest.into();
        Self {
            all_model_checkpoint_paths: vec![latest.clone()],
            model_checkpoint_path: latest,
        }
    }

    /// Read `<dir>/checkpoint`.
    pub fn read(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = dir.as_ref().join(STATE_FILE);
        if !path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse the text form.
    pub fn parse(text: &str) -> Result<Self, CheckpointError> {
        let mut latest = None;
        let mut all = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                CheckpointError::InvalidState(format!("line {}: expected `key: value`", lineno + 1))
            })?;
            let key = key.trim();
            if key != LATEST_KEY && key != ALL_KEY {
                // Timestamps and other bookkeeping fields
                continue;
            }

            let value = value
                .trim()
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| {
                    CheckpointError::InvalidState(format!("line {}: path must be quoted", lineno + 1))
                })?;
            if key == LATEST_KEY {
                latest = Some(PathBuf::from(value));
            } else {
                all.push(PathBuf::from(value));
            }
        }

        let model_checkpoint_path = latest.ok_or_else(|| {
            CheckpointError::InvalidState(format!("missing `{}`", LATEST_KEY))
        })?;
        Ok(Self {
            model_checkpoint_path,
            all_model_checkpoint_paths: all,
        })
    }

    /// Text form.
    pub fn render(&self) -> String {
        let mut text = format!("{}: \"{}\"\n", LATEST_KEY, self.model_checkpoint_path.display());
        for path in &self.all_model_checkpoint_paths {
            text.push_str(&format!("{}: \"{}\"\n", ALL_KEY, path.display()));
        }
        text
    }

    /// Write `<dir>/checkpoint`.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<(), CheckpointError> {
        fs::create_dir_all(dir.as_ref())?;
        fs::write(dir.as_ref().join(STATE_FILE), self.render())?;
        Ok(())
    }

    /// Episode of the most recent checkpoint.
    pub fn episode_token(&self) -> Option<String> {
        episode_token(&self.model_checkpoint_path)
    }
}

/// Episode encoded in a checkpoint path.
///
/// Takes the base name, drops everything from the first `.`, splits on `-`
/// and returns the second field: `runs/models/model-1200.bin` -> `1200`.
pub fn episode_token(path: impl AsRef<Path>) -> Option<String> {
    let name = path.as_ref().file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    stem.split('-').nth(1).map(str::to_string)
}

/// Path of the most recent checkpoint in `dir`.
pub fn latest_checkpoint(dir: impl AsRef<Path>) -> Result<PathBuf, CheckpointError> {
    Ok(CheckpointState::read(dir)?.model_checkpoint_path)
}
