//! Parameter groups and per-instance registries.
//!
//! Every layer of the network belongs to exactly one [`ParamGroup`]. Gradient
//! computation is requested per group set, and the registries below are
//! plain containers owned by the network instance (parameters) or by a single
//! forward pass (activations).

use burn::module::{ModuleVisitor, Param, ParamId};
use burn::prelude::*;

/// Named parameter groups of the attention option network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamGroup {
    /// Successor feature projection.
    SuccessorFeatures,
    /// Per-action intrinsic features (policy and mixed value inputs).
    OptionFeatures,
    /// Direction query projection.
    OptionPolicy,
    /// Extrinsic features, value and advantage heads.
    ValueExtrinsic,
    /// Termination features and termination head.
    Termination,
    /// Mixed value embedding matrix.
    ValueMixed,
}

impl ParamGroup {
    /// All groups, in declaration order.
    pub const ALL: [ParamGroup; 6] = [
        ParamGroup::SuccessorFeatures,
        ParamGroup::OptionFeatures,
        ParamGroup::OptionPolicy,
        ParamGroup::ValueExtrinsic,
        ParamGroup::Termination,
        ParamGroup::ValueMixed,
    ];

    /// Scope name used as a prefix in registries and summaries.
    pub fn scope(&self) -> &'static str {
        match self {
            ParamGroup::SuccessorFeatures => "succ_feat",
            ParamGroup::OptionFeatures => "option_features",
            ParamGroup::OptionPolicy => "option_policy",
            ParamGroup::ValueExtrinsic => "option_value_ext",
            ParamGroup::Termination => "option_term",
            ParamGroup::ValueMixed => "option_value_int",
        }
    }
}

/// Visitor that is told which layer it is about to see.
///
/// The network calls [`GroupVisitor::enter_layer`] before visiting each
/// layer of a group, so visitors can label the parameters they collect.
pub trait GroupVisitor<B: Backend>: ModuleVisitor<B> {
    fn enter_layer(&mut self, group: ParamGroup, layer: &'static str);
}

/// Name of the `index`-th parameter of a layer (`Linear` visits weight, then bias).
pub(crate) fn param_name(layer: &'static str, index: usize) -> String {
    match index {
        0 => format!("{}/weights", layer),
        1 => format!("{}/biases", layer),
        n => format!("{}/param_{}", layer, n),
    }
}

/// One trainable parameter of the network.
#[derive(Debug, Clone)]
pub struct ParamEntry {
    /// Owning group.
    pub group: ParamGroup,
    /// Layer name inside the group.
    pub layer: &'static str,
    /// Fully qualified name, `<scope>/<layer>/<param>`.
    pub name: String,
    /// Burn parameter id.
    pub id: ParamId,
    /// Parameter shape.
    pub shape: Vec<usize>,
}

impl ParamEntry {
    /// Number of scalar weights.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Trainable-parameter registry of one network instance.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    entries: Vec<ParamEntry>,
}

impl ParamRegistry {
    /// All registered parameters.
    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    /// Parameters of one group.
    pub fn group(&self, group: ParamGroup) -> impl Iterator<Item = &ParamEntry> {
        self.entries.iter().filter(move |e| e.group == group)
    }

    /// Parameter ids of a set of groups.
    pub fn ids(&self, groups: &[ParamGroup]) -> Vec<ParamId> {
        self.entries
            .iter()
            .filter(|e| groups.contains(&e.group))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Look up an entry by its qualified name.
    pub fn by_name(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Total number of scalar weights.
    pub fn num_params(&self) -> usize {
        self.entries.iter().map(ParamEntry::num_elements).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`ParamRegistry`] by visiting the network groups.
pub(crate) struct ParamCollector {
    registry: ParamRegistry,
    group: ParamGroup,
    layer: &'static str,
    index: usize,
}

impl ParamCollector {
    pub(crate) fn new() -> Self {
        Self {
            registry: ParamRegistry::default(),
            group: ParamGroup::SuccessorFeatures,
            layer: "",
            index: 0,
        }
    }

    pub(crate) fn into_registry(self) -> ParamRegistry {
        self.registry
    }
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.registry.entries.push(ParamEntry {
            group: self.group,
            layer: self.layer,
            name: format!("{}/{}", self.group.scope(), param_name(self.layer, self.index)),
            id: param.id.clone(),
            shape: param.val().dims().to_vec(),
        });
        self.index += 1;
    }
}

impl<B: Backend> GroupVisitor<B> for ParamCollector {
    fn enter_layer(&mut self, group: ParamGroup, layer: &'static str) {
        self.group = group;
        self.layer = layer;
        self.index = 0;
    }
}

/// Activations recorded during one forward pass, in recording order.
///
/// One-dimensional outputs are stored as [N, 1].
#[derive(Debug, Clone)]
pub struct ActivationRegistry<B: Backend> {
    entries: Vec<(&'static str, Tensor<B, 2>)>,
}

impl<B: Backend> Default for ActivationRegistry<B> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<B: Backend> ActivationRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an activation under `name`.
    pub fn record(&mut self, name: &'static str, activation: Tensor<B, 2>) {
        self.entries.push((name, activation));
    }

    /// Record a per-item scalar activation [N] as [N, 1].
    pub fn record_scalar(&mut self, name: &'static str, activation: Tensor<B, 1>) {
        self.entries.push((name, activation.unsqueeze_dim(1)));
    }

    /// Most recent activation recorded under `name`.
    pub fn get(&self, name: &str) -> Option<&Tensor<B, 2>> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    /// Recorded names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Tensor<B, 2>)> {
        self.entries.iter().map(|(n, t)| (*n, t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_group_scopes_are_unique() {
        let mut scopes: Vec<_> = ParamGroup::ALL.iter().map(|g| g.scope()).collect();
        scopes.sort();
        scopes.dedup();
        assert_eq!(scopes.len(), ParamGroup::ALL.len());
    }

    #[test]
    fn test_param_names() {
        assert_eq!(param_name("sf", 0), "sf/weights");
        assert_eq!(param_name("sf", 1), "sf/biases");
        assert_eq!(param_name("sf", 2), "sf/param_2");
    }

    #[test]
    fn test_activation_registry_lookup() {
        let device = Default::default();
        let mut registry = ActivationRegistry::<TestBackend>::new();
        assert!(registry.is_empty());

        registry.record("sf", Tensor::zeros([2, 3], &device));
        registry.record_scalar("termination", Tensor::ones([2], &device));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["sf", "termination"]);
        assert_eq!(registry.get("termination").unwrap().dims(), [2, 1]);
        assert!(registry.get("missing").is_none());
    }
}
