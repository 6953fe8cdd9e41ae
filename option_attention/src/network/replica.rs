//! Global and worker replicas of the network.
//!
//! The global replica owns the parameters and, when clustering is enabled,
//! the [`DirectionClusterStore`]. Workers start from a copy of the global
//! parameters and read the clusters through a weak handle. Losses and
//! gradients are only built on workers.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use super::network::{AttentionOptionNetwork, AttentionOptionNetworkConfig, NetworkOutput};
use super::params::ParamGroup;
use crate::clusters::{ClusterHandle, DirectionClusterStore, SharedClusterStore};
use crate::config::OptionCriticConfig;
use crate::error::{OptionCriticError, Result};
use crate::losses::{loss_gradients, LossComposer, LossGradients, LossKind, LossTerms, TrainingBatch};

/// Role of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaRole {
    /// Parameter owner.
    Global,
    /// Training worker with its id.
    Worker(usize),
}

impl ReplicaRole {
    pub fn is_global(&self) -> bool {
        matches!(self, ReplicaRole::Global)
    }

    /// `global` or `worker_<id>`.
    pub fn scope(&self) -> String {
        match self {
            ReplicaRole::Global => "global".to_string(),
            ReplicaRole::Worker(id) => format!("worker_{}", id),
        }
    }
}

#[derive(Debug, Clone)]
enum ClusterAccess {
    /// Strong owner (global replica).
    Owner(SharedClusterStore),
    /// Weak handle (workers).
    Replica(ClusterHandle),
    /// Clustering disabled; the caller supplies clusters.
    External,
}

/// One replica of the attention option network.
#[derive(Debug)]
pub struct OptionCriticReplica<B: Backend> {
    role: ReplicaRole,
    config: OptionCriticConfig,
    network: AttentionOptionNetwork<B>,
    composer: LossComposer,
    clusters: ClusterAccess,
}

impl<B: Backend> OptionCriticReplica<B> {
    /// Build the global replica.
    ///
    /// Validates the configuration and, with `use_clustering`, loads or
    /// initializes the direction clusters.
    pub fn global(config: OptionCriticConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let clusters = if config.use_clustering {
            ClusterAccess::Owner(DirectionClusterStore::load_or_init(&config)?.share())
        } else {
            ClusterAccess::External
        };

        log::info!(
            "Built {} replica (clustering: {})",
            ReplicaRole::Global.scope(),
            config.use_clustering
        );
        Ok(Self {
            role: ReplicaRole::Global,
            network: AttentionOptionNetworkConfig::from_config(&config).init(device),
            composer: LossComposer::from_config(&config),
            config,
            clusters,
        })
    }

    /// Worker replica starting from this replica's parameters.
    pub fn worker(&self, id: usize) -> Self {
        let clusters = match &self.clusters {
            ClusterAccess::Owner(store) => ClusterAccess::Replica(ClusterHandle::new(store)),
            other => other.clone(),
        };
        let role = ReplicaRole::Worker(id);
        log::debug!("Built {} replica from {}", role.scope(), self.role.scope());

        Self {
            role,
            config: self.config.clone(),
            network: self.network.clone(),
            composer: self.composer,
            clusters,
        }
    }

    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    pub fn config(&self) -> &OptionCriticConfig {
        &self.config
    }

    pub fn network(&self) -> &AttentionOptionNetwork<B> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut AttentionOptionNetwork<B> {
        &mut self.network
    }

    /// Replace the parameters, e.g. with the global replica's latest.
    pub fn set_network(&mut self, network: AttentionOptionNetwork<B>) {
        self.network = network;
    }

    /// Copy the parameters of another replica.
    pub fn sync_from(&mut self, other: &Self) {
        self.network = other.network.clone();
    }

    pub fn composer(&self) -> &LossComposer {
        &self.composer
    }

    /// Strong store handle (global replica with clustering only).
    pub fn cluster_store(&self) -> Option<&SharedClusterStore> {
        match &self.clusters {
            ClusterAccess::Owner(store) => Some(store),
            _ => None,
        }
    }

    /// Weak store handle, for any replica with clustering.
    pub fn cluster_handle(&self) -> Option<ClusterHandle> {
        match &self.clusters {
            ClusterAccess::Owner(store) => Some(ClusterHandle::new(store)),
            ClusterAccess::Replica(handle) => Some(handle.clone()),
            ClusterAccess::External => None,
        }
    }

    /// Current raw cluster prototypes as a [K, D] tensor.
    pub fn direction_clusters(&self, device: &B::Device) -> Result<Tensor<B, 2>> {
        let array = match &self.clusters {
            ClusterAccess::Owner(store) => store.read().directions(),
            ClusterAccess::Replica(handle) => handle.snapshot()?,
            ClusterAccess::External => return Err(OptionCriticError::ClustersUnavailable),
        };
        array.ensure_shape(self.config.nb_options, self.config.goal_embedding_size())?;
        Ok(array.to_tensor(device))
    }

    /// Check caller-supplied clusters are [nb_options, D].
    fn ensure_cluster_shape(&self, clusters: &Tensor<B, 2>) -> Result<()> {
        let expected = [self.config.nb_options, self.config.goal_embedding_size()];
        if clusters.dims() != expected {
            return Err(OptionCriticError::ShapeMismatch {
                what: "direction clusters",
                expected: expected.to_vec(),
                got: clusters.dims().to_vec(),
            });
        }
        Ok(())
    }

    /// Forward pass with the managed clusters.
    pub fn forward(
        &self,
        observation: Tensor<B, 2>,
        direction_override: Option<Tensor<B, 2>>,
    ) -> Result<NetworkOutput<B>> {
        let clusters = self.direction_clusters(&observation.device())?;
        Ok(self.network.forward(observation, clusters, direction_override))
    }

    /// Forward pass with caller-supplied clusters.
    pub fn forward_with_clusters(
        &self,
        observation: Tensor<B, 2>,
        direction_clusters: Tensor<B, 2>,
        direction_override: Option<Tensor<B, 2>>,
    ) -> Result<NetworkOutput<B>> {
        self.ensure_cluster_shape(&direction_clusters)?;
        Ok(self
            .network
            .forward(observation, direction_clusters, direction_override))
    }

    fn ensure_worker(&self) -> Result<()> {
        if self.role.is_global() {
            return Err(OptionCriticError::GlobalReplicaLoss);
        }
        Ok(())
    }

    fn batch_clusters(&self, batch: &TrainingBatch<B>) -> Result<Tensor<B, 2>> {
        match &batch.direction_clusters {
            Some(clusters) => {
                self.ensure_cluster_shape(clusters)?;
                Ok(clusters.clone())
            }
            None => self.direction_clusters(&batch.observation.device()),
        }
    }

    /// All loss terms of a batch.
    pub fn losses(&self, batch: &TrainingBatch<B>) -> Result<LossTerms<B>> {
        self.ensure_worker()?;
        let clusters = self.batch_clusters(batch)?;
        let output = self.network.forward(
            batch.observation.clone(),
            clusters,
            batch.direction_override.clone(),
        );
        Ok(self.composer.compose(&output, &batch.targets))
    }
}

impl<B: AutodiffBackend> OptionCriticReplica<B> {
    /// Gradients of one loss over every parameter group.
    pub fn gradients(&self, batch: &TrainingBatch<B>, kind: LossKind) -> Result<LossGradients<B>> {
        self.gradients_for(batch, kind, &ParamGroup::ALL)
    }

    /// Gradients of one loss over selected parameter groups.
    pub fn gradients_for(
        &self,
        batch: &TrainingBatch<B>,
        kind: LossKind,
        groups: &[ParamGroup],
    ) -> Result<LossGradients<B>> {
        self.ensure_worker()?;
        let clusters = self.batch_clusters(batch)?;
        Ok(loss_gradients(
            &self.network,
            clusters,
            batch,
            &self.composer,
            kind,
            groups,
        ))
    }

    /// Gradients of all five losses, in [`LossKind::ALL`] order.
    pub fn all_gradients(&self, batch: &TrainingBatch<B>) -> Result<Vec<LossGradients<B>>> {
        LossKind::ALL
            .iter()
            .map(|kind| self.gradients(batch, *kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::{save_snapshot, snapshot_path, DirectionArray};
    use crate::losses::LossTargets;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;
    type TestAutodiff = Autodiff<NdArray<f32>>;

    fn config(logdir: &std::path::Path) -> OptionCriticConfig {
        OptionCriticConfig::new()
            .with_nb_states(6)
            .with_sf_layers(vec![4])
            .with_nb_options(3)
            .with_action_size(2)
            .with_max_clusters(16)
            .with_logdir(logdir)
    }

    fn clusters() -> DirectionArray {
        DirectionArray::from_rows(&[
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ])
        .unwrap()
    }

    fn batch<B: Backend>(device: &B::Device) -> TrainingBatch<B> {
        TrainingBatch::new(
            Tensor::random([2, 6], Distribution::Normal(0.0, 1.0), device),
            LossTargets {
                actions: Tensor::from_ints([1, 0], device),
                target_sf: Tensor::zeros([2, 4], device),
                target_direction: Tensor::ones([2, 4], device),
                target_mix_return: Tensor::ones([2], device),
                target_return: Tensor::ones([2], device),
            },
        )
    }

    #[test]
    fn test_roles() {
        assert!(ReplicaRole::Global.is_global());
        assert!(!ReplicaRole::Worker(3).is_global());
        assert_eq!(ReplicaRole::Global.scope(), "global");
        assert_eq!(ReplicaRole::Worker(3).scope(), "worker_3");
    }

    #[test]
    fn test_global_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let config = config(dir.path()).with_nb_options(0);
        let result = OptionCriticReplica::<TestBackend>::global(config, &Default::default());
        assert!(matches!(result, Err(OptionCriticError::Config(_))));
    }

    #[test]
    fn test_global_loads_snapshot_and_workers_share_it() {
        let dir = tempdir().unwrap();
        save_snapshot(snapshot_path(dir.path(), "0"), &clusters()).unwrap();

        let device = Default::default();
        let global = OptionCriticReplica::<TestBackend>::global(config(dir.path()), &device).unwrap();
        let store = global.cluster_store().unwrap();
        assert!(store.read().directions_init());

        let worker = global.worker(0);
        assert_eq!(worker.role(), ReplicaRole::Worker(0));
        assert!(worker.cluster_store().is_none());

        let from_worker = worker.direction_clusters(&device).unwrap();
        assert_eq!(DirectionArray::from_tensor(from_worker), clusters());
    }

    #[test]
    fn test_worker_sees_online_updates() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let global = OptionCriticReplica::<TestBackend>::global(config(dir.path()), &device).unwrap();
        let worker = global.worker(1);

        global
            .cluster_store()
            .unwrap()
            .write()
            .observe(&[0.5, 0.5, 0.0, 0.0])
            .unwrap();

        let array = DirectionArray::from_tensor(worker.direction_clusters(&device).unwrap());
        assert_eq!(array.row(0), &[0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_worker_after_global_dropped() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let global = OptionCriticReplica::<TestBackend>::global(config(dir.path()), &device).unwrap();
        let worker = global.worker(0);
        drop(global);

        assert!(matches!(
            worker.direction_clusters(&device),
            Err(OptionCriticError::ClusterOwnerDropped)
        ));
    }

    #[test]
    fn test_external_clusters() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(dir.path()).with_use_clustering(false);
        let global = OptionCriticReplica::<TestBackend>::global(config, &device).unwrap();
        let worker = global.worker(0);

        assert!(worker.cluster_handle().is_none());
        assert!(matches!(
            worker.forward(Tensor::zeros([1, 6], &device), None),
            Err(OptionCriticError::ClustersUnavailable)
        ));

        let output = worker.forward_with_clusters(
            Tensor::zeros([1, 6], &device),
            clusters().to_tensor(&device),
            None,
        )
        .unwrap();
        assert_eq!(output.policy.probs.dims(), [1, 2]);

        let supplied = batch::<TestBackend>(&device).with_direction_clusters(clusters().to_tensor(&device));
        assert!(worker.losses(&supplied).is_ok());
    }

    #[test]
    fn test_supplied_clusters_with_wrong_shape() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(dir.path()).with_use_clustering(false);
        let worker = OptionCriticReplica::<TestAutodiff>::global(config, &device)
            .unwrap()
            .worker(0);
        let wrong = || Tensor::<TestAutodiff, 2>::ones([2, 4], &device);

        assert!(matches!(
            worker.forward_with_clusters(Tensor::zeros([1, 6], &device), wrong(), None),
            Err(OptionCriticError::ShapeMismatch { .. })
        ));

        let supplied = batch::<TestAutodiff>(&device).with_direction_clusters(wrong());
        assert!(matches!(
            worker.losses(&supplied),
            Err(OptionCriticError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            worker.gradients(&supplied, LossKind::Direction),
            Err(OptionCriticError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_losses_only_on_workers() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let global = OptionCriticReplica::<TestBackend>::global(config(dir.path()), &device).unwrap();

        assert!(matches!(
            global.losses(&batch(&device)),
            Err(OptionCriticError::GlobalReplicaLoss)
        ));
        assert!(global.worker(0).losses(&batch(&device)).is_ok());
    }

    #[test]
    fn test_worker_gradients_and_sync() {
        let dir = tempdir().unwrap();
        save_snapshot(snapshot_path(dir.path(), "0"), &clusters()).unwrap();
        let device = Default::default();

        let global = OptionCriticReplica::<TestAutodiff>::global(config(dir.path()), &device).unwrap();
        let mut worker = global.worker(0);

        assert!(matches!(
            global.gradients(&batch(&device), LossKind::Critic),
            Err(OptionCriticError::GlobalReplicaLoss)
        ));

        let all = worker.all_gradients(&batch(&device)).unwrap();
        let kinds: Vec<LossKind> = all.iter().map(|g| g.kind).collect();
        assert_eq!(kinds, LossKind::ALL.to_vec());
        assert!(all.iter().all(|g| !g.norms.is_empty()));

        let only_mixed = worker
            .gradients_for(&batch(&device), LossKind::Option, &[ParamGroup::ValueMixed])
            .unwrap();
        assert!(only_mixed.norms.iter().all(|n| n.group == ParamGroup::ValueMixed));

        worker.sync_from(&global);
        assert_eq!(worker.network().nb_options(), 3);
    }
}
