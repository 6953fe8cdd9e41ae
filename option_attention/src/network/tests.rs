//! End-to-end checks of the network, loss and gradient wiring.

use burn::backend::{Autodiff, NdArray};
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::{Distribution, ElementConversion};

use super::*;
use crate::nn::floored_l2_normalize;
use crate::losses::{loss_gradients, LossCoefficients, LossComposer, LossKind, LossTargets, TrainingBatch};

type TestBackend = NdArray<f32>;
type TestAutodiff = Autodiff<NdArray<f32>>;

const NB_STATES: usize = 5;
const D: usize = 4;
const K: usize = 3;
const A: usize = 2;

fn network<B: Backend>(device: &B::Device) -> AttentionOptionNetwork<B> {
    AttentionOptionNetworkConfig::new(NB_STATES, D, A, K).init(device)
}

fn symmetric_clusters<B: Backend>(device: &B::Device) -> Tensor<B, 2> {
    Tensor::ones([K, D], device)
}

fn to_vec<B: Backend, const R: usize>(t: Tensor<B, R>) -> Vec<f32> {
    t.into_data().iter::<f32>().collect()
}

fn matching_targets<B: Backend>(output: &NetworkOutput<B>, device: &B::Device) -> LossTargets<B> {
    LossTargets {
        actions: Tensor::zeros([output.batch_size()], device),
        target_sf: output.features.sf.clone(),
        target_direction: output.current_option_direction(),
        target_mix_return: output.values.value_mix.clone(),
        target_return: output.values.value_ext.clone(),
    }
}

#[test]
fn test_zero_observation_with_symmetric_clusters() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);

    let output = network.forward(Tensor::zeros([1, NB_STATES], &device), symmetric_clusters(&device), None);

    assert!(to_vec(output.features.sf.clone()).iter().all(|v| *v == 0.0));
    for w in to_vec(output.attention.attention_weights.clone()) {
        assert!((w - 1.0 / K as f32).abs() < 1e-6);
    }

    // The direction projection reduces to its bias
    let bias = network.backbone.direction.bias.as_ref().unwrap().val().reshape([1, D]);
    assert_eq!(to_vec(output.features.direction_features.clone()), to_vec(bias.clone()));

    let expected = to_vec(floored_l2_normalize(bias, 1));
    let query = to_vec(output.attention.query_direction.clone());
    for (q, e) in query.iter().zip(&expected) {
        assert!((q - e).abs() < 1e-6);
    }

    let again = network.forward(Tensor::zeros([1, NB_STATES], &device), Tensor::ones([K, D], &device), None);
    assert_eq!(to_vec(again.attention.query_direction), query);
}

#[test]
fn test_output_shapes() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let obs = Tensor::random([7, NB_STATES], Distribution::Normal(0.0, 1.0), &device);
    let clusters = Tensor::random([K, D], Distribution::Normal(0.0, 1.0), &device);

    let output = network.forward(obs, clusters, None);
    assert_eq!(output.batch_size(), 7);
    assert_eq!(output.attention.attention_weights.dims(), [7, K]);
    assert_eq!(output.selected_direction.dims(), [7, D]);
    assert_eq!(output.values.q_ext.dims(), [7]);
    assert_eq!(output.termination.dims(), [7]);
    assert_eq!(output.policy.probs.dims(), [7, A]);
}

#[test]
fn test_policy_and_attention_are_distributions() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let obs = Tensor::random([9, NB_STATES], Distribution::Normal(0.0, 2.0), &device);
    let clusters = Tensor::random([K, D], Distribution::Normal(0.0, 1.0), &device);

    let output = network.forward(obs, clusters, None);

    for probs in [output.policy.probs.clone(), output.attention.attention_weights.clone()] {
        assert!(to_vec(probs.clone()).iter().all(|p| *p >= 0.0));
        for s in to_vec(probs.sum_dim(1)) {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }
}

#[test]
fn test_direction_override_reaches_heads_only() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let obs = Tensor::random([2, NB_STATES], Distribution::Normal(0.0, 1.0), &device);
    let clusters = Tensor::random([K, D], Distribution::Uniform(0.1, 1.0), &device);
    let override_dir = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]], &device);

    let live = network.forward(obs.clone(), clusters.clone(), None);
    let overridden = network.forward(obs, clusters, Some(override_dir.clone()));

    assert_eq!(to_vec(overridden.selected_direction.clone()), to_vec(override_dir));
    // Attention is unaffected by the override
    assert_eq!(
        to_vec(live.current_option_direction()),
        to_vec(overridden.current_option_direction())
    );
    // Extrinsic value does not depend on the direction
    assert_eq!(to_vec(live.values.value_ext), to_vec(overridden.values.value_ext));
}

#[test]
fn test_activation_registry_contents() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let output = network.forward(Tensor::zeros([3, NB_STATES], &device), symmetric_clusters(&device), None);

    for name in [
        "sf",
        "intrinsic_features",
        "direction_features",
        "extrinsic_features",
        "term_feat",
        "query_content_match",
        "attention_weights",
        "current_option_direction",
        "value_ext",
        "adv_ext",
        "fc_option_value",
        "termination",
        "option_policy",
    ] {
        assert!(output.activations.get(name).is_some(), "missing activation {}", name);
    }
    assert_eq!(output.activations.get("termination").unwrap().dims(), [3, 1]);
}

#[test]
fn test_param_registry_groups() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let registry = network.param_registry();

    assert!(registry.by_name("succ_feat/sf/weights").is_some());
    assert!(registry.by_name("succ_feat/sf/biases").is_none());
    assert_eq!(
        registry.by_name("option_value_int/value_embedding/weights").unwrap().shape,
        vec![A * D + D, 1]
    );
    assert_eq!(
        registry.by_name("option_features/intrinsic_features/weights").unwrap().shape,
        vec![NB_STATES, A * D]
    );
    for group in ParamGroup::ALL {
        assert!(registry.group(group).count() > 0, "empty group {:?}", group);
    }

    // sf: W; intrinsic, direction, extrinsic, term_feat: W + b; value_ext,
    // adv_ext, termination: W + b; value_embedding: W
    assert_eq!(registry.len(), 1 + 4 * 2 + 3 * 2 + 1);

    let expected = NB_STATES * D
        + (NB_STATES * A * D + A * D)
        + 3 * (NB_STATES * D + D)
        + (D + 1)
        + (2 * D + 1)
        + (2 * D + 1)
        + (A * D + D);
    assert_eq!(registry.num_params(), expected);
}

#[test]
fn test_registries_are_per_instance() {
    let device = Default::default();
    let a = network::<TestBackend>(&device);
    let b = network::<TestBackend>(&device);

    let ids_a = a.param_registry().ids(&ParamGroup::ALL);
    let ids_b = b.param_registry().ids(&ParamGroup::ALL);
    assert_eq!(ids_a.len(), ids_b.len());
    assert!(ids_a.iter().all(|id| !ids_b.contains(id)));
}

#[test]
fn test_matching_targets_zero_losses() {
    let device = Default::default();
    let network = network::<TestBackend>(&device);
    let obs = Tensor::random([1, NB_STATES], Distribution::Normal(0.0, 1.0), &device);
    let output = network.forward(obs, symmetric_clusters(&device), None);

    let composer = LossComposer::new(LossCoefficients {
        sf_coef: 1.0,
        eigen_critic_coef: 1.0,
        entropy_coef: 0.0,
    });
    let terms = composer.compose(&output, &matching_targets(&output, &device));
    let values = terms.values();

    assert_eq!(values.sf, 0.0);
    assert_eq!(values.critic, 0.0);
    assert_eq!(values.entropy, 0.0);

    let term_err = to_vec(terms.term_err);
    let adv = to_vec(output.values.adv_ext.clone());
    assert!((term_err[0] - adv[0]).abs() < 1e-5);
}

#[test]
fn test_every_loss_has_gradients() {
    let device = Default::default();
    let network = network::<TestAutodiff>(&device);
    let clusters = Tensor::random([K, D], Distribution::Uniform(0.1, 1.0), &device);
    let batch = TrainingBatch::new(
        Tensor::random([3, NB_STATES], Distribution::Normal(0.0, 1.0), &device),
        LossTargets {
            actions: Tensor::from_ints([1, 0, 1], &device),
            target_sf: Tensor::random([3, D], Distribution::Normal(0.0, 1.0), &device),
            target_direction: Tensor::random([3, D], Distribution::Uniform(0.1, 1.0), &device),
            target_mix_return: Tensor::random([3], Distribution::Normal(0.0, 1.0), &device),
            target_return: Tensor::random([3], Distribution::Normal(0.0, 1.0), &device),
        },
    );

    for kind in LossKind::ALL {
        let grads = loss_gradients(
            &network,
            clusters.clone(),
            &batch,
            &LossComposer::default(),
            kind,
            &ParamGroup::ALL,
        );
        assert!(!grads.norms.is_empty(), "no gradients for {}", kind);
        assert!(grads.loss().is_finite());
        assert_eq!(grads.summary.kind, kind);
    }
}

#[test]
fn test_training_reduces_critic_loss() {
    let device = Default::default();
    let mut network = network::<TestAutodiff>(&device);
    let clusters = symmetric_clusters::<TestAutodiff>(&device);
    let batch = TrainingBatch::new(
        Tensor::random([8, NB_STATES], Distribution::Normal(0.0, 1.0), &device),
        LossTargets {
            actions: Tensor::zeros([8], &device),
            target_sf: Tensor::zeros([8, D], &device),
            target_direction: Tensor::ones([8, D], &device),
            target_mix_return: Tensor::zeros([8], &device),
            target_return: Tensor::ones([8], &device).mul_scalar(3.0),
        },
    );
    let composer = LossComposer::default();
    let mut optimizer = AdamConfig::new().init::<TestAutodiff, AttentionOptionNetwork<TestAutodiff>>();

    let critic = |network: &AttentionOptionNetwork<TestAutodiff>| -> f32 {
        let output = network.forward(batch.observation.clone(), clusters.clone(), None);
        composer
            .compose(&output, &batch.targets)
            .critic_loss
            .into_scalar()
            .elem()
    };

    let initial = critic(&network);
    for _ in 0..50 {
        let grads = loss_gradients(
            &network,
            clusters.clone(),
            &batch,
            &composer,
            LossKind::Critic,
            &[ParamGroup::ValueExtrinsic],
        );
        network = grads.apply(&mut optimizer, 5e-2, network);
    }

    assert!(critic(&network) < initial);
}
