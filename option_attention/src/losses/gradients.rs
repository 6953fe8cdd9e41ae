//! Per-loss gradient computation.
//!
//! Each [`LossKind`] is differentiated on its own forward pass, so the
//! gradients of one loss never share a graph with another. Gradients are
//! collected only for the requested [`ParamGroup`]s and can be applied with
//! any burn optimizer.

use burn::module::{ModuleVisitor, Param};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use super::composer::{LossComposer, LossValues, TrainingBatch};
use crate::metrics::summaries::SummaryBundle;
use crate::network::params::{param_name, GroupVisitor, ParamGroup};
use crate::network::AttentionOptionNetwork;

/// The five independently optimized losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossKind {
    SuccessorFeatures,
    Option,
    Critic,
    Termination,
    Direction,
}

impl LossKind {
    pub const ALL: [LossKind; 5] = [
        LossKind::SuccessorFeatures,
        LossKind::Option,
        LossKind::Critic,
        LossKind::Termination,
        LossKind::Direction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LossKind::SuccessorFeatures => "sf",
            LossKind::Option => "option",
            LossKind::Critic => "critic",
            LossKind::Termination => "term",
            LossKind::Direction => "direction",
        }
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// L2 norm of one parameter gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGradNorm {
    pub group: ParamGroup,
    pub layer: &'static str,
    /// Qualified parameter name, `<scope>/<layer>/<param>`
    pub name: String,
    pub norm: f32,
}

/// Gradients of one loss with respect to a set of parameter groups.
pub struct LossGradients<B: AutodiffBackend> {
    pub kind: LossKind,
    /// Every loss term of the pass that produced the gradients
    pub values: LossValues,
    pub grads: GradientsParams,
    /// Per-parameter gradient norms, in visiting order
    pub norms: Vec<ParamGradNorm>,
    pub summary: SummaryBundle,
    _backend: std::marker::PhantomData<B>,
}

impl<B: AutodiffBackend> LossGradients<B> {
    /// Value of the differentiated loss.
    pub fn loss(&self) -> f32 {
        self.values.get(self.kind)
    }

    /// Norm over all collected gradients.
    pub fn global_norm(&self) -> f32 {
        self.norms.iter().map(|n| n.norm * n.norm).sum::<f32>().sqrt()
    }

    /// Norm of one parameter's gradient.
    pub fn norm(&self, name: &str) -> Option<f32> {
        self.norms.iter().find(|n| n.name == name).map(|n| n.norm)
    }

    /// Step `optimizer` on `network` with these gradients.
    pub fn apply<O>(
        self,
        optimizer: &mut O,
        lr: f64,
        network: AttentionOptionNetwork<B>,
    ) -> AttentionOptionNetwork<B>
    where
        O: Optimizer<AttentionOptionNetwork<B>, B>,
    {
        optimizer.step(lr, network, self.grads)
    }
}

/// Moves gradients of the visited parameters out of the backward result.
struct GradientCollector<'a, B: AutodiffBackend> {
    grads: &'a mut B::Gradients,
    params: GradientsParams,
    norms: Vec<ParamGradNorm>,
    group: ParamGroup,
    layer: &'static str,
    index: usize,
}

impl<'a, B: AutodiffBackend> GradientCollector<'a, B> {
    fn new(grads: &'a mut B::Gradients) -> Self {
        Self {
            grads,
            params: GradientsParams::new(),
            norms: Vec::new(),
            group: ParamGroup::SuccessorFeatures,
            layer: "",
            index: 0,
        }
    }
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientCollector<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        // Parameters outside the loss graph have no gradient
        if let Some(grad) = param.val().grad_remove(self.grads) {
            let norm: f32 = grad.clone().powf_scalar(2.0).sum().into_scalar().elem();
            self.norms.push(ParamGradNorm {
                group: self.group,
                layer: self.layer,
                name: format!("{}/{}", self.group.scope(), param_name(self.layer, self.index)),
                norm: norm.sqrt(),
            });
            self.params.register(param.id, grad);
        }
        self.index += 1;
    }
}

impl<B: AutodiffBackend> GroupVisitor<B> for GradientCollector<'_, B> {
    fn enter_layer(&mut self, group: ParamGroup, layer: &'static str) {
        self.group = group;
        self.layer = layer;
        self.index = 0;
    }
}

/// Differentiate one loss on a fresh forward pass.
///
/// # Arguments
/// * `network` - Network to differentiate
/// * `direction_clusters` - Raw cluster prototypes [K, D]
/// * `batch` - Observations, override and targets; its own clusters are ignored
/// * `composer` - Loss composer
/// * `kind` - Loss to differentiate
/// * `groups` - Parameter groups to collect gradients for
pub fn loss_gradients<B: AutodiffBackend>(
    network: &AttentionOptionNetwork<B>,
    direction_clusters: Tensor<B, 2>,
    batch: &TrainingBatch<B>,
    composer: &LossComposer,
    kind: LossKind,
    groups: &[ParamGroup],
) -> LossGradients<B> {
    let output = network.forward(
        batch.observation.clone(),
        direction_clusters,
        batch.direction_override.clone(),
    );
    let terms = composer.compose(&output, &batch.targets);
    let values = terms.values();

    let mut backward = terms.loss(kind).backward();
    let mut collector = GradientCollector::<B>::new(&mut backward);
    network.visit_groups(groups, &mut collector);
    let GradientCollector { params, norms, .. } = collector;

    for n in &norms {
        log::debug!("[{}] grad norm {} = {:.6}", kind, n.name, n.norm);
    }

    let summary = SummaryBundle::collect(kind, &output.activations, &values, &norms);

    LossGradients {
        kind,
        values,
        grads: params,
        norms,
        summary,
        _backend: std::marker::PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::losses::composer::LossTargets;
    use crate::network::AttentionOptionNetworkConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use burn::tensor::Distribution;

    type TestBackend = Autodiff<NdArray<f32>>;

    const N: usize = 4;

    fn setup() -> (AttentionOptionNetwork<TestBackend>, Tensor<TestBackend, 2>, TrainingBatch<TestBackend>) {
        let device = Default::default();
        let network = AttentionOptionNetworkConfig::new(5, 3, 2, 4).init::<TestBackend>(&device);
        let clusters = Tensor::random([4, 3], Distribution::Uniform(0.1, 1.0), &device);

        let batch = TrainingBatch::new(
            Tensor::random([N, 5], Distribution::Normal(0.0, 1.0), &device),
            LossTargets {
                actions: Tensor::from_ints([0, 1, 1, 0], &device),
                target_sf: Tensor::random([N, 3], Distribution::Normal(0.0, 1.0), &device),
                target_direction: Tensor::random([N, 3], Distribution::Uniform(0.1, 1.0), &device),
                target_mix_return: Tensor::random([N], Distribution::Normal(0.0, 1.0), &device),
                target_return: Tensor::random([N], Distribution::Normal(0.0, 1.0), &device),
            },
        );
        (network, clusters, batch)
    }

    fn grads(kind: LossKind) -> LossGradients<TestBackend> {
        let (network, clusters, batch) = setup();
        loss_gradients(&network, clusters, &batch, &LossComposer::default(), kind, &ParamGroup::ALL)
    }

    #[test]
    fn test_sf_gradients_only_touch_sf() {
        let grads = grads(LossKind::SuccessorFeatures);

        assert_eq!(grads.norms.len(), 1);
        assert_eq!(grads.norms[0].name, "succ_feat/sf/weights");
        assert!(grads.norms[0].norm > 0.0);
        assert!(grads.global_norm() > 0.0);
    }

    #[test]
    fn test_critic_gradients() {
        let grads = grads(LossKind::Critic);

        assert!(grads.norm("option_value_ext/value_ext/weights").is_some());
        assert!(grads.norm("option_value_ext/extrinsic_features/weights").is_some());
        assert!(grads.norm("succ_feat/sf/weights").is_none());
        assert!(grads.norm("option_term/termination/weights").is_none());
    }

    #[test]
    fn test_term_gradients() {
        let grads = grads(LossKind::Termination);

        assert!(grads.norm("option_term/termination/weights").is_some());
        assert!(grads.norm("option_term/term_feat/weights").is_some());
        // Advantage enters the termination loss detached
        assert!(grads.norm("option_value_ext/adv_ext/weights").is_none());
    }

    #[test]
    fn test_direction_gradients_include_td_error() {
        let grads = grads(LossKind::Direction);

        assert!(grads.norm("option_policy/direction_features/weights").is_some());
        assert!(grads.norm("option_value_ext/value_ext/weights").is_some());
    }

    #[test]
    fn test_option_gradients() {
        let grads = grads(LossKind::Option);

        assert!(grads.norm("option_features/intrinsic_features/weights").is_some());
        assert!(grads.norm("option_value_int/value_embedding/weights").is_some());
        assert!(grads.norm("option_policy/direction_features/weights").is_some());
    }

    #[test]
    fn test_group_filter() {
        let (network, clusters, batch) = setup();
        let grads = loss_gradients(
            &network,
            clusters,
            &batch,
            &LossComposer::default(),
            LossKind::Option,
            &[ParamGroup::ValueMixed],
        );

        assert_eq!(grads.norms.len(), 1);
        assert!(grads.norms.iter().all(|n| n.group == ParamGroup::ValueMixed));
    }

    #[test]
    fn test_apply_updates_parameters() {
        let (network, clusters, mut batch) = setup();
        batch.targets.target_sf = batch.targets.target_sf.add_scalar(5.0);

        let before = network.backbone.sf.weight.val().into_data().to_vec::<f32>().unwrap();
        let grads = loss_gradients(
            &network,
            clusters,
            &batch,
            &LossComposer::default(),
            LossKind::SuccessorFeatures,
            &ParamGroup::ALL,
        );

        let mut optimizer = AdamConfig::new().init::<TestBackend, AttentionOptionNetwork<TestBackend>>();
        let network = grads.apply(&mut optimizer, 1e-2, network);
        let after = network.backbone.sf.weight.val().into_data().to_vec::<f32>().unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_summary_is_attached() {
        let grads = grads(LossKind::Termination);
        assert_eq!(grads.summary.kind, LossKind::Termination);
        assert!(grads.summary.activation("termination").is_some());
        assert_eq!(grads.summary.scalar("Term_loss"), Some(grads.loss()));
    }
}
