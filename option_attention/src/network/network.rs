//! The attention option-critic network.
//!
//! # Forward pass
//!
//! ```text
//! observation ──► FeatureBackbone ──► sf, policy/value features, query,
//!                                     extrinsic features, term features
//! query + clusters ──► select_direction ──► current_option_direction
//! selected = override.unwrap_or(current_option_direction)
//! selected ──► ValueHeads, TerminationHead, option_policy
//! ```
//!
//! The override lets a loss computation condition the heads on a target
//! direction (e.g. the option that was actually executed) instead of the
//! network's live selection.

use burn::module::Module;
use burn::prelude::*;

use super::backbone::{FeatureBackbone, FeatureBackboneConfig, FeatureOutput};
use super::heads::{option_policy, PolicyOutput, TerminationHead, ValueHeads, ValueOutput};
use super::params::{ActivationRegistry, GroupVisitor, ParamCollector, ParamGroup, ParamRegistry};
use crate::config::OptionCriticConfig;
use crate::nn::attention::{select_direction, AttentionOutput};

/// Dimensions of an [`AttentionOptionNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionOptionNetworkConfig {
    /// Observation size
    pub nb_states: usize,
    /// Embedding size D
    pub embedding_size: usize,
    /// Number of actions A
    pub action_size: usize,
    /// Number of direction clusters K
    pub nb_options: usize,
}

impl AttentionOptionNetworkConfig {
    pub fn new(nb_states: usize, embedding_size: usize, action_size: usize, nb_options: usize) -> Self {
        Self {
            nb_states,
            embedding_size,
            action_size,
            nb_options,
        }
    }

    /// Take the dimensions from a full option-critic configuration.
    pub fn from_config(config: &OptionCriticConfig) -> Self {
        Self::new(
            config.nb_states,
            config.goal_embedding_size(),
            config.action_size,
            config.nb_options,
        )
    }

    /// Initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionOptionNetwork<B> {
        AttentionOptionNetwork {
            backbone: FeatureBackboneConfig::new(self.nb_states, self.embedding_size, self.action_size)
                .init(device),
            value_heads: ValueHeads::new(self.embedding_size, self.action_size, device),
            termination: TerminationHead::new(self.embedding_size, device),
            nb_states: self.nb_states,
            nb_options: self.nb_options,
        }
    }
}

/// Option-critic network with attention-based direction selection.
#[derive(Module, Debug)]
pub struct AttentionOptionNetwork<B: Backend> {
    pub backbone: FeatureBackbone<B>,
    pub value_heads: ValueHeads<B>,
    pub termination: TerminationHead<B>,
    nb_states: usize,
    nb_options: usize,
}

/// Everything computed by one forward pass.
#[derive(Debug, Clone)]
pub struct NetworkOutput<B: Backend> {
    /// Backbone features
    pub features: FeatureOutput<B>,
    /// Attention over direction clusters (live selection)
    pub attention: AttentionOutput<B>,
    /// Direction the heads were conditioned on [N, D]
    pub selected_direction: Tensor<B, 2>,
    /// Value estimates
    pub values: ValueOutput<B>,
    /// Termination probability [N]
    pub termination: Tensor<B, 1>,
    /// Intra-option policy
    pub policy: PolicyOutput<B>,
    /// Activations recorded during this pass
    pub activations: ActivationRegistry<B>,
}

impl<B: Backend> NetworkOutput<B> {
    /// Live option direction [N, D], ignoring any override.
    pub fn current_option_direction(&self) -> Tensor<B, 2> {
        self.attention.current_option_direction.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.features.sf.dims()[0]
    }
}

impl<B: Backend> AttentionOptionNetwork<B> {
    /// Forward pass.
    ///
    /// # Arguments
    /// * `observation` - [N, nb_states]
    /// * `direction_clusters` - Raw cluster prototypes [K, D]
    /// * `direction_override` - Optional direction [N, D] replacing the live
    ///   selection as input to the heads
    ///
    /// # Panics
    /// On shape mismatches between the inputs and the network dimensions.
    pub fn forward(
        &self,
        observation: Tensor<B, 2>,
        direction_clusters: Tensor<B, 2>,
        direction_override: Option<Tensor<B, 2>>,
    ) -> NetworkOutput<B> {
        let [batch_size, nb_states] = observation.dims();
        assert_eq!(
            nb_states, self.nb_states,
            "observation size ({}) must match nb_states ({})",
            nb_states, self.nb_states
        );
        let [nb_options, _] = direction_clusters.dims();
        assert_eq!(
            nb_options, self.nb_options,
            "cluster count ({}) must match nb_options ({})",
            nb_options, self.nb_options
        );

        let mut activations = ActivationRegistry::new();

        let features = self.backbone.forward(observation);
        activations.record("sf", features.sf.clone());
        activations.record("intrinsic_features", features.value_features.clone());
        activations.record("direction_features", features.direction_features.clone());
        activations.record("extrinsic_features", features.extrinsic_features.clone());
        activations.record("term_feat", features.term_features.clone());

        let attention = select_direction(features.direction_features.clone(), direction_clusters);
        activations.record("query_content_match", attention.query_content_match.clone());
        activations.record("attention_weights", attention.attention_weights.clone());
        activations.record(
            "current_option_direction",
            attention.current_option_direction.clone(),
        );

        let selected_direction = match direction_override {
            Some(direction) => {
                assert_eq!(
                    direction.dims(),
                    [batch_size, self.embedding_size()],
                    "direction override must be [batch, embedding]"
                );
                direction
            }
            None => attention.current_option_direction.clone(),
        };

        let values = self.value_heads.forward(
            features.extrinsic_features.clone(),
            features.value_features.clone(),
            selected_direction.clone(),
        );
        activations.record_scalar("value_ext", values.value_ext.clone());
        activations.record_scalar("adv_ext", values.adv_ext.clone());
        activations.record_scalar("fc_option_value", values.value_mix.clone());

        let termination = self
            .termination
            .forward(features.term_features.clone(), selected_direction.clone());
        activations.record_scalar("termination", termination.clone());

        let policy = option_policy(features.policy_features.clone(), selected_direction.clone());
        activations.record("option_policy", policy.probs.clone());

        NetworkOutput {
            features,
            attention,
            selected_direction,
            values,
            termination,
            policy,
            activations,
        }
    }

    /// Visit the layers of one parameter group.
    pub fn visit_group<V: GroupVisitor<B>>(&self, group: ParamGroup, visitor: &mut V) {
        match group {
            ParamGroup::SuccessorFeatures => {
                visitor.enter_layer(group, "sf");
                self.backbone.sf.visit(visitor);
            }
            ParamGroup::OptionFeatures => {
                visitor.enter_layer(group, "intrinsic_features");
                self.backbone.intrinsic.visit(visitor);
            }
            ParamGroup::OptionPolicy => {
                visitor.enter_layer(group, "direction_features");
                self.backbone.direction.visit(visitor);
            }
            ParamGroup::ValueExtrinsic => {
                visitor.enter_layer(group, "extrinsic_features");
                self.backbone.extrinsic.visit(visitor);
                visitor.enter_layer(group, "value_ext");
                self.value_heads.value_ext.visit(visitor);
                visitor.enter_layer(group, "adv_ext");
                self.value_heads.adv_ext.visit(visitor);
            }
            ParamGroup::Termination => {
                visitor.enter_layer(group, "term_feat");
                self.backbone.term.visit(visitor);
                visitor.enter_layer(group, "termination");
                self.termination.linear.visit(visitor);
            }
            ParamGroup::ValueMixed => {
                visitor.enter_layer(group, "value_embedding");
                self.value_heads.value_embedding.visit(visitor);
            }
        }
    }

    /// Visit the layers of several groups, in the given order.
    pub fn visit_groups<V: GroupVisitor<B>>(&self, groups: &[ParamGroup], visitor: &mut V) {
        for group in groups {
            self.visit_group(*group, visitor);
        }
    }

    /// Registry of every trainable parameter, tagged by group.
    pub fn param_registry(&self) -> ParamRegistry {
        let mut collector = ParamCollector::new();
        self.visit_groups(&ParamGroup::ALL, &mut collector);
        collector.into_registry()
    }

    pub fn nb_states(&self) -> usize {
        self.nb_states
    }

    pub fn nb_options(&self) -> usize {
        self.nb_options
    }

    pub fn embedding_size(&self) -> usize {
        self.backbone.embedding_size()
    }

    pub fn action_size(&self) -> usize {
        self.backbone.action_size()
    }
}
