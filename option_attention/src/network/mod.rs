//! The attention option-critic network.
//!
//! # Modules
//!
//! - [`backbone`]: Linear feature projections of the observation
//! - [`heads`]: Value, termination and intra-option policy heads
//! - [`params`]: Parameter groups and per-instance registries
//! - [`network`]: The assembled network and its forward pass
//! - [`replica`]: Global and worker replicas

pub mod backbone;
pub mod heads;
pub mod params;
#[allow(clippy::module_inception)]
pub mod network;
pub mod replica;

#[cfg(test)]
mod tests;

pub use backbone::{FeatureBackbone, FeatureBackboneConfig, FeatureOutput};
pub use heads::{
    option_policy, responsible_actions, PolicyOutput, TerminationHead, ValueHeads, ValueOutput,
};
pub use network::{AttentionOptionNetwork, AttentionOptionNetworkConfig, NetworkOutput};
pub use params::{
    ActivationRegistry, GroupVisitor, ParamEntry, ParamGroup, ParamRegistry,
};
pub use replica::{OptionCriticReplica, ReplicaRole};
