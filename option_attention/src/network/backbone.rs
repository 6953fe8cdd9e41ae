//! Shared feature backbone.
//!
//! Five independent linear projections of the observation, no activation:
//!
//! | Layer              | Output  | Bias | Group             |
//! |--------------------|---------|------|-------------------|
//! | sf                 | D       | no   | SuccessorFeatures |
//! | intrinsic_features | A * D   | yes  | OptionFeatures    |
//! | direction_features | D       | yes  | OptionPolicy      |
//! | extrinsic_features | D       | yes  | ValueExtrinsic    |
//! | term_feat          | D       | yes  | Termination       |

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

/// Configuration for [`FeatureBackbone`].
#[derive(Debug, Clone)]
pub struct FeatureBackboneConfig {
    /// Observation size
    pub nb_states: usize,
    /// Embedding size D
    pub embedding_size: usize,
    /// Number of actions A
    pub action_size: usize,
}

impl FeatureBackboneConfig {
    pub fn new(nb_states: usize, embedding_size: usize, action_size: usize) -> Self {
        Self {
            nb_states,
            embedding_size,
            action_size,
        }
    }

    fn projection(&self, d_output: usize, bias: bool) -> LinearConfig {
        LinearConfig::new(self.nb_states, d_output)
            .with_bias(bias)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
    }

    /// Initialize the backbone.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureBackbone<B> {
        let d = self.embedding_size;
        FeatureBackbone {
            sf: self.projection(d, false).init(device),
            intrinsic: self.projection(self.action_size * d, true).init(device),
            direction: self.projection(d, true).init(device),
            extrinsic: self.projection(d, true).init(device),
            term: self.projection(d, true).init(device),
            action_size: self.action_size,
            embedding_size: d,
        }
    }
}

/// Linear feature projections of the observation.
#[derive(Module, Debug)]
pub struct FeatureBackbone<B: Backend> {
    /// Successor features (no bias)
    pub sf: Linear<B>,
    /// Per-action intrinsic features, flat A * D
    pub intrinsic: Linear<B>,
    /// Direction query features
    pub direction: Linear<B>,
    /// Extrinsic value features
    pub extrinsic: Linear<B>,
    /// Termination features
    pub term: Linear<B>,
    action_size: usize,
    embedding_size: usize,
}

/// Features produced by one backbone pass.
#[derive(Debug, Clone)]
pub struct FeatureOutput<B: Backend> {
    /// Successor features [N, D]
    pub sf: Tensor<B, 2>,
    /// Intrinsic features reshaped per action [N, A, D]
    pub policy_features: Tensor<B, 3>,
    /// Intrinsic features, flat [N, A * D]
    pub value_features: Tensor<B, 2>,
    /// Raw direction query [N, D]
    pub direction_features: Tensor<B, 2>,
    /// Extrinsic features [N, D]
    pub extrinsic_features: Tensor<B, 2>,
    /// Termination features [N, D]
    pub term_features: Tensor<B, 2>,
}

impl<B: Backend> FeatureBackbone<B> {
    /// Project a batch of observations [N, nb_states].
    pub fn forward(&self, observation: Tensor<B, 2>) -> FeatureOutput<B> {
        let [batch_size, _] = observation.dims();

        let sf = self.sf.forward(observation.clone());
        let value_features = self.intrinsic.forward(observation.clone());
        let policy_features =
            value_features
                .clone()
                .reshape([batch_size, self.action_size, self.embedding_size]);
        let direction_features = self.direction.forward(observation.clone());
        let extrinsic_features = self.extrinsic.forward(observation.clone());
        let term_features = self.term.forward(observation);

        FeatureOutput {
            sf,
            policy_features,
            value_features,
            direction_features,
            extrinsic_features,
            term_features,
        }
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}
