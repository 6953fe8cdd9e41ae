//! Loss composition.
//!
//! | Loss | Formula |
//! |---|---|
//! | sf | `mean(sf_coef * huber(target_sf - sf))` |
//! | mix_critic | `mean(0.5 * eigen_critic_coef * (target_mix_return - value_mix)²)` |
//! | critic | `mean(0.5 * (target_return - value_ext)²)` |
//! | term | `mean(termination * sg(q_ext - value_ext))` |
//! | direction | `mean(cos(target_direction, current_option_direction) * (target_return - value_ext))` |
//! | entropy | `-entropy_coef * mean(policy * ln(policy + 1e-7))` |
//! | policy | `-mean(ln(responsible + 1e-7) * sg(target_mix_return - value_mix))` |
//! | option | `policy - entropy + mix_critic` |
//!
//! `sg` is stop-gradient. The direction loss keeps the gradient of its TD
//! error and uses the live option direction, even when the heads were
//! conditioned on an override.

use burn::prelude::*;
use burn::tensor::{ElementConversion, Int};

use super::gradients::LossKind;
use crate::config::OptionCriticConfig;
use crate::network::heads::responsible_actions;
use crate::network::NetworkOutput;
use crate::nn::normalize::{cosine_similarity, huber_loss};

/// Huber threshold of the successor feature loss.
pub const HUBER_DELTA: f32 = 1.0;

/// Added inside logarithms.
pub const LOG_EPS: f32 = 1e-7;

/// Training targets for one batch.
#[derive(Debug, Clone)]
pub struct LossTargets<B: Backend> {
    /// Taken actions [N]
    pub actions: Tensor<B, 1, Int>,
    /// Successor feature targets [N, D]
    pub target_sf: Tensor<B, 2>,
    /// Direction the agent actually followed [N, D]
    pub target_direction: Tensor<B, 2>,
    /// Mixed return targets [N]
    pub target_mix_return: Tensor<B, 1>,
    /// Extrinsic return targets [N]
    pub target_return: Tensor<B, 1>,
}

/// One training batch.
#[derive(Debug, Clone)]
pub struct TrainingBatch<B: Backend> {
    /// Observations [N, nb_states]
    pub observation: Tensor<B, 2>,
    /// Raw cluster prototypes [K, D]; `None` reads them from the cluster store
    pub direction_clusters: Option<Tensor<B, 2>>,
    /// Direction override for the heads [N, D]
    pub direction_override: Option<Tensor<B, 2>>,
    pub targets: LossTargets<B>,
}

impl<B: Backend> TrainingBatch<B> {
    pub fn new(observation: Tensor<B, 2>, targets: LossTargets<B>) -> Self {
        Self {
            observation,
            direction_clusters: None,
            direction_override: None,
            targets,
        }
    }

    pub fn with_direction_clusters(mut self, clusters: Tensor<B, 2>) -> Self {
        self.direction_clusters = Some(clusters);
        self
    }

    pub fn with_direction_override(mut self, direction: Tensor<B, 2>) -> Self {
        self.direction_override = Some(direction);
        self
    }
}

/// Loss coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossCoefficients {
    pub sf_coef: f32,
    pub eigen_critic_coef: f32,
    pub entropy_coef: f32,
}

impl Default for LossCoefficients {
    fn default() -> Self {
        Self::from_config(&OptionCriticConfig::default())
    }
}

impl LossCoefficients {
    pub fn from_config(config: &OptionCriticConfig) -> Self {
        Self {
            sf_coef: config.sf_coef,
            eigen_critic_coef: config.eigen_critic_coef,
            entropy_coef: config.entropy_coef,
        }
    }
}

/// All loss terms of one batch, still attached to the graph.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub sf_loss: Tensor<B, 1>,
    pub mix_critic_loss: Tensor<B, 1>,
    pub critic_loss: Tensor<B, 1>,
    pub term_loss: Tensor<B, 1>,
    pub direction_loss: Tensor<B, 1>,
    pub entropy_loss: Tensor<B, 1>,
    pub policy_loss: Tensor<B, 1>,
    pub option_loss: Tensor<B, 1>,
    /// Detached `q_ext - value_ext` [N]
    pub term_err: Tensor<B, 1>,
    /// Probability of the taken action [N]
    pub responsible_actions: Tensor<B, 1>,
}

/// Host values of the loss terms.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    pub sf: f32,
    pub mix_critic: f32,
    pub critic: f32,
    pub term: f32,
    pub direction: f32,
    pub entropy: f32,
    pub policy: f32,
    pub option: f32,
}

impl LossValues {
    /// Value of the loss optimized by `kind`.
    pub fn get(&self, kind: LossKind) -> f32 {
        match kind {
            LossKind::SuccessorFeatures => self.sf,
            LossKind::Option => self.option,
            LossKind::Critic => self.critic,
            LossKind::Termination => self.term,
            LossKind::Direction => self.direction,
        }
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone().into_scalar().elem()
}

impl<B: Backend> LossTerms<B> {
    /// The loss optimized by `kind`.
    pub fn loss(&self, kind: LossKind) -> Tensor<B, 1> {
        match kind {
            LossKind::SuccessorFeatures => self.sf_loss.clone(),
            LossKind::Option => self.option_loss.clone(),
            LossKind::Critic => self.critic_loss.clone(),
            LossKind::Termination => self.term_loss.clone(),
            LossKind::Direction => self.direction_loss.clone(),
        }
    }

    pub fn values(&self) -> LossValues {
        LossValues {
            sf: scalar(&self.sf_loss),
            mix_critic: scalar(&self.mix_critic_loss),
            critic: scalar(&self.critic_loss),
            term: scalar(&self.term_loss),
            direction: scalar(&self.direction_loss),
            entropy: scalar(&self.entropy_loss),
            policy: scalar(&self.policy_loss),
            option: scalar(&self.option_loss),
        }
    }
}

/// Builds the loss terms from a forward pass and its targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossComposer {
    coefficients: LossCoefficients,
}

impl LossComposer {
    pub fn new(coefficients: LossCoefficients) -> Self {
        Self { coefficients }
    }

    pub fn from_config(config: &OptionCriticConfig) -> Self {
        Self::new(LossCoefficients::from_config(config))
    }

    pub fn coefficients(&self) -> &LossCoefficients {
        &self.coefficients
    }

    /// Compose every loss term.
    pub fn compose<B: Backend>(
        &self,
        output: &NetworkOutput<B>,
        targets: &LossTargets<B>,
    ) -> LossTerms<B> {
        let coefs = &self.coefficients;
        let values = &output.values;
        let batch_size = output.batch_size();

        let sf_td_error = targets.target_sf.clone() - output.features.sf.clone();
        let sf_loss = huber_loss(sf_td_error, HUBER_DELTA)
            .mul_scalar(coefs.sf_coef)
            .mean();

        let mix_td_error = targets.target_mix_return.clone() - values.value_mix.clone();
        let mix_critic_loss = mix_td_error
            .clone()
            .powf_scalar(2.0)
            .mul_scalar(0.5 * coefs.eigen_critic_coef)
            .mean();

        let td_error = targets.target_return.clone() - values.value_ext.clone();
        let critic_loss = td_error.clone().powf_scalar(2.0).mul_scalar(0.5).mean();

        let term_err = (values.q_ext.clone() - values.value_ext.clone()).detach();
        let term_loss = (output.termination.clone() * term_err.clone()).mean();

        // [N, N] similarities, TD error broadcast over the columns
        let similarity = cosine_similarity(
            targets.target_direction.clone(),
            output.current_option_direction(),
        );
        let direction_loss = (similarity * td_error.reshape([1, batch_size])).mean();

        let probs = output.policy.probs.clone();
        let entropy_loss = (probs.clone() * probs.clone().add_scalar(LOG_EPS).log())
            .mean()
            .mul_scalar(-coefs.entropy_coef);

        let responsible = responsible_actions(probs, targets.actions.clone());
        let policy_loss = (responsible.clone().add_scalar(LOG_EPS).log() * mix_td_error.detach())
            .mean()
            .neg();

        let option_loss = policy_loss.clone() - entropy_loss.clone() + mix_critic_loss.clone();

        LossTerms {
            sf_loss,
            mix_critic_loss,
            critic_loss,
            term_loss,
            direction_loss,
            entropy_loss,
            policy_loss,
            option_loss,
            term_err,
            responsible_actions: responsible,
        }
    }
}
