//! Summary bundles, one per loss kind.
//!
//! | Kind | Activations | Scalars |
//! |---|---|---|
//! | sf | `sf` | `SF_loss` |
//! | option | `query_content_match`, `attention_weights`, `current_option_direction`, `option_policy` | `Entropy_loss`, `Policy_loss`, `Mix_critic_loss` |
//! | critic | | `Critic_loss` |
//! | term | `termination` | `Term_loss` |
//! | direction | | `Direction_loss` |
//!
//! Every bundle also carries the gradient norms of its loss.

use burn::prelude::*;

use crate::losses::{LossKind, LossValues, ParamGradNorm};
use crate::network::params::ActivationRegistry;

/// Activations summarized for `kind`.
pub fn summarized_activations(kind: LossKind) -> &'static [&'static str] {
    match kind {
        LossKind::SuccessorFeatures => &["sf"],
        LossKind::Option => &[
            "query_content_match",
            "attention_weights",
            "current_option_direction",
            "option_policy",
        ],
        LossKind::Termination => &["termination"],
        LossKind::Critic | LossKind::Direction => &[],
    }
}

/// Scalar tags reported for `kind`.
pub fn summarized_scalars(kind: LossKind, values: &LossValues) -> Vec<(&'static str, f32)> {
    match kind {
        LossKind::SuccessorFeatures => vec![("SF_loss", values.sf)],
        LossKind::Option => vec![
            ("Entropy_loss", values.entropy),
            ("Policy_loss", values.policy),
            ("Mix_critic_loss", values.mix_critic),
        ],
        LossKind::Critic => vec![("Critic_loss", values.critic)],
        LossKind::Termination => vec![("Term_loss", values.term)],
        LossKind::Direction => vec![("Direction_loss", values.direction)],
    }
}

/// Statistics of one activation tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationSummary {
    pub name: &'static str,
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    /// Fraction of exactly zero entries
    pub zero_fraction: f32,
}

impl ActivationSummary {
    pub fn from_values(name: &'static str, values: &[f32]) -> Self {
        if values.is_empty() {
            return Self {
                name,
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
                zero_fraction: 0.0,
            };
        }

        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let zeros = values.iter().filter(|v| **v == 0.0).count();

        Self {
            name,
            mean,
            std: variance.sqrt(),
            min,
            max,
            zero_fraction: zeros as f32 / n,
        }
    }

    pub fn from_tensor<B: Backend, const D: usize>(name: &'static str, tensor: Tensor<B, D>) -> Self {
        let values: Vec<f32> = tensor.into_data().iter::<f32>().collect();
        Self::from_values(name, &values)
    }
}

/// Everything reported after one loss step.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryBundle {
    pub kind: LossKind,
    pub activations: Vec<ActivationSummary>,
    pub scalars: Vec<(&'static str, f32)>,
    pub grad_norms: Vec<ParamGradNorm>,
}

impl SummaryBundle {
    /// Build the bundle of `kind` from one pass.
    ///
    /// Activations missing from the registry are skipped.
    pub fn collect<B: Backend>(
        kind: LossKind,
        activations: &ActivationRegistry<B>,
        values: &LossValues,
        grad_norms: &[ParamGradNorm],
    ) -> Self {
        let activations = summarized_activations(kind)
            .iter()
            .filter_map(|name| {
                activations
                    .get(name)
                    .map(|t| ActivationSummary::from_tensor(name, t.clone()))
            })
            .collect();

        Self {
            kind,
            activations,
            scalars: summarized_scalars(kind, values),
            grad_norms: grad_norms.to_vec(),
        }
    }

    pub fn activation(&self, name: &str) -> Option<&ActivationSummary> {
        self.activations.iter().find(|a| a.name == name)
    }

    pub fn scalar(&self, tag: &str) -> Option<f32> {
        self.scalars.iter().find(|(t, _)| *t == tag).map(|(_, v)| *v)
    }

    /// Norm over all gradients in the bundle.
    pub fn global_grad_norm(&self) -> f32 {
        self.grad_norms
            .iter()
            .map(|n| n.norm * n.norm)
            .sum::<f32>()
            .sqrt()
    }
}
