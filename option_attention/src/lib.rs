//! # Option Attention: attention-based option-critic network
//!
//! Options are directions in a learned successor-feature space. Each state
//! attends over a set of clustered direction prototypes, and the resulting
//! direction conditions the value, termination and intra-option policy heads.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   observation [N, nb_states]                      │
//! │                               │                                   │
//! │                               ▼                                   │
//! │  FeatureBackbone: sf | intrinsic | direction | extrinsic | term   │
//! │                               │                                   │
//! │        direction ──► select_direction ◄── DirectionClusterStore   │
//! │                               │            (owned by the global   │
//! │                               ▼             replica, weak handles │
//! │                  current_option_direction   on workers)           │
//! │                               │                                   │
//! │          ┌────────────────────┼────────────────────┐              │
//! │          ▼                    ▼                    ▼              │
//! │     ValueHeads         TerminationHead        option_policy       │
//! │          └────────────────────┼────────────────────┘              │
//! │                               ▼                                   │
//! │       LossComposer: sf | option | critic | term | direction       │
//! │                               │                                   │
//! │                               ▼                                   │
//! │      per-loss gradients + SummaryBundle ──► MetricsLogger         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use option_attention::{OptionCriticConfig, OptionCriticReplica, LossKind};
//!
//! let config = OptionCriticConfig::from_json_file("config.json")?;
//! let global = OptionCriticReplica::<Autodiff<NdArray>>::global(config, &device)?;
//! let worker = global.worker(0);
//!
//! for kind in LossKind::ALL {
//!     let grads = worker.gradients(&batch, kind)?;
//!     logger.log(&LossSnapshot::new(step, episode).with_values(grads.values));
//!     network = grads.apply(&mut optimizer, lr, network);
//! }
//! ```

pub mod error;
pub mod config;
pub mod nn;
pub mod network;
pub mod clusters;
pub mod checkpoint;
pub mod losses;
pub mod metrics;

pub use error::{OptionCriticError, Result};
pub use config::OptionCriticConfig;

// Network
pub use network::{
    AttentionOptionNetwork, AttentionOptionNetworkConfig, NetworkOutput,
    OptionCriticReplica, ReplicaRole,
    ParamGroup, ParamRegistry, ActivationRegistry,
    PolicyOutput, ValueOutput,
};
pub use nn::{select_direction, AttentionOutput};

// Direction clusters
pub use clusters::{
    ClusterHandle, DirectionArray, DirectionClusterStore, OnlineCluster, SharedClusterStore,
};

// Losses
pub use losses::{
    LossCoefficients, LossComposer, LossGradients, LossKind, LossTargets, LossTerms,
    LossValues, TrainingBatch,
};

// Persistence and metrics
pub use checkpoint::{CheckpointState, Checkpointer, CheckpointerConfig};
pub use metrics::{
    ConsoleLogger, CSVLogger, LossSnapshot, MetricsLogger, MultiLogger, SummaryBundle,
};
