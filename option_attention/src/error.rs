//! Error types for the option-critic network.

use std::path::PathBuf;

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Errors raised while configuring, constructing or training the network.
#[derive(Error, Debug)]
pub enum OptionCriticError {
    /// Invalid or inconsistent configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Resuming was requested but the checkpoint state could not be resolved.
    #[error("Cannot resume from {dir:?}: {reason}")]
    Resume { dir: PathBuf, reason: String },

    /// A tensor or array did not have the expected shape.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// The replica's cluster handle points to a store that no longer exists.
    #[error("Direction cluster owner was dropped")]
    ClusterOwnerDropped,

    /// Clustering is disabled, so the caller must supply the clusters.
    #[error("Direction clusters are not managed by this replica")]
    ClustersUnavailable,

    /// Losses were requested on the parameter-owner replica.
    #[error("Losses are only built for worker replicas")]
    GlobalReplicaLoss,

    /// Cluster snapshot (de)serialization failed.
    #[error("Snapshot error at {path:?}: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    /// Config file (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model checkpoint failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OptionCriticError>;
