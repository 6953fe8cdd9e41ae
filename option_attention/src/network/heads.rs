//! Heads conditioned on the selected option direction.
//!
//! - [`ValueHeads`]: extrinsic value, advantage, Q and the mixed value
//! - [`TerminationHead`]: per-state termination probability
//! - [`option_policy`]: intra-option policy from per-action features

use burn::module::{Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use burn::tensor::Int;

use crate::nn::init::normalized_columns_weights;

// ============================================================================
// Value heads
// ============================================================================

/// Extrinsic and mixed value heads.
#[derive(Module, Debug)]
pub struct ValueHeads<B: Backend> {
    /// V_ext(s) from extrinsic features
    pub value_ext: Linear<B>,
    /// A_ext(s, d) from extrinsic features and the (detached) direction
    pub adv_ext: Linear<B>,
    /// Mixed value weights [A * D + D, 1], no bias
    pub value_embedding: Param<Tensor<B, 2>>,
}

/// Value estimates for a batch.
#[derive(Debug, Clone)]
pub struct ValueOutput<B: Backend> {
    /// [N]
    pub value_ext: Tensor<B, 1>,
    /// [N]
    pub adv_ext: Tensor<B, 1>,
    /// value_ext + adv_ext [N]
    pub q_ext: Tensor<B, 1>,
    /// [N]
    pub value_mix: Tensor<B, 1>,
}

impl<B: Backend> ValueHeads<B> {
    /// Create the heads for embedding size `d` and `action_size` actions.
    pub fn new(embedding_size: usize, action_size: usize, device: &B::Device) -> Self {
        let linear = |d_input: usize| {
            LinearConfig::new(d_input, 1)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };
        let mix_rows = action_size * embedding_size + embedding_size;

        Self {
            value_ext: linear(embedding_size),
            adv_ext: linear(2 * embedding_size),
            value_embedding: Param::from_tensor(normalized_columns_weights(
                mix_rows, 1, 1.0, device,
            )),
        }
    }

    /// Evaluate all value heads.
    ///
    /// # Arguments
    /// * `extrinsic_features` - [N, D]
    /// * `value_features` - Flat intrinsic features [N, A * D]
    /// * `direction` - Selected option direction [N, D]
    pub fn forward(
        &self,
        extrinsic_features: Tensor<B, 2>,
        value_features: Tensor<B, 2>,
        direction: Tensor<B, 2>,
    ) -> ValueOutput<B> {
        let value_ext: Tensor<B, 1> = self
            .value_ext
            .forward(extrinsic_features.clone())
            .flatten(0, 1);

        // The advantage head does not train the direction selection
        let adv_input = Tensor::cat(vec![extrinsic_features, direction.clone().detach()], 1);
        let adv_ext: Tensor<B, 1> = self.adv_ext.forward(adv_input).flatten(0, 1);

        let q_ext = value_ext.clone() + adv_ext.clone();

        let mix_input = Tensor::cat(vec![value_features, direction], 1);
        let value_mix: Tensor<B, 1> = mix_input.matmul(self.value_embedding.val()).flatten(0, 1);

        ValueOutput {
            value_ext,
            adv_ext,
            q_ext,
            value_mix,
        }
    }
}

// ============================================================================
// Termination head
// ============================================================================

/// Sigmoid termination head over termination features and direction.
#[derive(Module, Debug)]
pub struct TerminationHead<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> TerminationHead<B> {
    pub fn new(embedding_size: usize, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(2 * embedding_size, 1)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
        }
    }

    /// Termination probability [N] in [0, 1].
    pub fn forward(&self, term_features: Tensor<B, 2>, direction: Tensor<B, 2>) -> Tensor<B, 1> {
        let input = Tensor::cat(vec![term_features, direction], 1);
        sigmoid(self.linear.forward(input)).flatten(0, 1)
    }
}

// ============================================================================
// Policy head
// ============================================================================

/// Intra-option policy for a batch.
#[derive(Debug, Clone)]
pub struct PolicyOutput<B: Backend> {
    /// Per-action logits [N, A]
    pub logits: Tensor<B, 2>,
    /// Action probabilities [N, A]
    pub probs: Tensor<B, 2>,
}

/// Intra-option policy: `logits[b, i] = Σ_j direction[b, j] * features[b, i, j]`.
///
/// # Arguments
/// * `policy_features` - Per-action features [N, A, D]
/// * `direction` - Selected option direction [N, D]
pub fn option_policy<B: Backend>(
    policy_features: Tensor<B, 3>,
    direction: Tensor<B, 2>,
) -> PolicyOutput<B> {
    let [batch_size, action_size, _] = policy_features.dims();

    let logits = (policy_features * direction.unsqueeze_dim::<3>(1))
        .sum_dim(2)
        .reshape([batch_size, action_size]);
    let probs = softmax(logits.clone(), 1);

    PolicyOutput { logits, probs }
}

impl<B: Backend> PolicyOutput<B> {
    /// Probabilities as row-major host data.
    fn host_probs(&self) -> (usize, Vec<f32>) {
        let [_, action_size] = self.probs.dims();
        let data = self.probs.clone().into_data();
        (action_size, data.iter::<f32>().collect())
    }

    /// Sample one action per row from the policy.
    pub fn sample_actions(&self) -> Vec<usize> {
        let (action_size, probs) = self.host_probs();

        probs
            .chunks(action_size)
            .map(|row| {
                let rand_val = fastrand::f32();
                let mut cumsum = 0.0;
                for (a, p) in row.iter().enumerate() {
                    cumsum += p;
                    // Last action absorbs rounding error
                    if rand_val < cumsum || a == action_size - 1 {
                        return a;
                    }
                }
                action_size - 1
            })
            .collect()
    }

    /// Most probable action per row.
    pub fn greedy_actions(&self) -> Vec<usize> {
        let (action_size, probs) = self.host_probs();

        probs
            .chunks(action_size)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (a, &p)| {
                        if p > best.1 {
                            (a, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Probability of the taken action per row.
///
/// # Arguments
/// * `policy` - Action probabilities [N, A]
/// * `actions` - Taken action indices [N]
pub fn responsible_actions<B: Backend>(
    policy: Tensor<B, 2>,
    actions: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let [batch_size] = actions.dims();
    policy.gather(1, actions.reshape([batch_size, 1])).flatten(0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_value_heads_shapes_and_q() {
        let device = Default::default();
        let heads = ValueHeads::<TestBackend>::new(4, 3, &device);

        let ext = Tensor::random([5, 4], Distribution::Normal(0.0, 1.0), &device);
        let val = Tensor::random([5, 12], Distribution::Normal(0.0, 1.0), &device);
        let dir = Tensor::random([5, 4], Distribution::Normal(0.0, 1.0), &device);

        let out = heads.forward(ext, val, dir);
        assert_eq!(out.value_ext.dims(), [5]);
        assert_eq!(out.value_mix.dims(), [5]);

        let q = to_vec(out.q_ext);
        let v = to_vec(out.value_ext);
        let a = to_vec(out.adv_ext);
        for i in 0..5 {
            assert!((q[i] - (v[i] + a[i])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_value_embedding_shape_and_norm() {
        let device = Default::default();
        let heads = ValueHeads::<TestBackend>::new(4, 2, &device);

        let w = heads.value_embedding.val();
        assert_eq!(w.dims(), [12, 1]);
        let norm: f32 = w.powf_scalar(2.0).sum().sqrt().into_scalar().elem();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_value_mix_is_bilinear_in_inputs() {
        let device = Default::default();
        let heads = ValueHeads::<TestBackend>::new(2, 1, &device);

        let ext = Tensor::zeros([1, 2], &device);
        let zero_val = Tensor::zeros([1, 2], &device);
        let zero_dir = Tensor::zeros([1, 2], &device);

        // No bias: all-zero inputs give a zero mixed value
        let out = heads.forward(ext, zero_val, zero_dir);
        assert_eq!(to_vec(out.value_mix)[0], 0.0);
    }

    #[test]
    fn test_termination_in_unit_interval() {
        let device = Default::default();
        let head = TerminationHead::<TestBackend>::new(3, &device);

        let feats = Tensor::random([16, 3], Distribution::Normal(0.0, 10.0), &device);
        let dir = Tensor::random([16, 3], Distribution::Normal(0.0, 1.0), &device);

        for p in to_vec(head.forward(feats, dir)) {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_option_policy_dot_products() {
        let device = Default::default();
        // One state, two actions, D = 2
        let features = Tensor::<TestBackend, 3>::from_floats([[[1.0, 0.0], [0.0, 2.0]]], &device);
        let direction = Tensor::<TestBackend, 2>::from_floats([[3.0, 1.0]], &device);

        let out = option_policy(features, direction);
        let logits = to_vec(out.logits);
        assert_eq!(logits, vec![3.0, 2.0]);

        let probs = to_vec(out.probs);
        let e = std::f32::consts::E;
        assert!((probs[0] - e / (1.0 + e)).abs() < 1e-5);
    }

    #[test]
    fn test_option_policy_rows_sum_to_one() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 3>::random([7, 4, 3], Distribution::Normal(0.0, 2.0), &device);
        let direction = Tensor::<TestBackend, 2>::random([7, 3], Distribution::Normal(0.0, 1.0), &device);

        let out = option_policy(features, direction);
        for p in to_vec(out.probs.clone()) {
            assert!(p >= 0.0);
        }
        for s in to_vec(out.probs.sum_dim(1)) {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sampling_and_greedy() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 50.0, 0.0], [50.0, 0.0, 0.0]], &device);
        let out = PolicyOutput {
            probs: softmax(logits.clone(), 1),
            logits,
        };

        assert_eq!(out.greedy_actions(), vec![1, 0]);
        for _ in 0..10 {
            assert_eq!(out.sample_actions(), vec![1, 0]);
        }
    }

    #[test]
    fn test_responsible_actions() {
        let device = Default::default();
        let policy = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9], [0.7, 0.3]], &device);
        let actions = Tensor::<TestBackend, 1, Int>::from_ints([1, 0], &device);

        let picked = to_vec(responsible_actions(policy, actions));
        assert!((picked[0] - 0.9).abs() < 1e-6);
        assert!((picked[1] - 0.7).abs() < 1e-6);
    }
}
