//! Direction cluster store.
//!
//! The global replica owns the store; worker replicas read it through a
//! [`ClusterHandle`] (a weak reference). The store is either a fixed snapshot
//! loaded from disk or an [`OnlineCluster`] accumulator that an external
//! maintenance path feeds with points.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::online::OnlineCluster;
use super::snapshot::{load_snapshot, save_snapshot, snapshot_path, DirectionArray};
use crate::checkpoint::CheckpointState;
use crate::config::OptionCriticConfig;
use crate::error::{OptionCriticError, Result};

/// Episode token used when training starts from scratch.
pub const INITIAL_EPISODE: &str = "0";

/// Where the prototypes come from.
#[derive(Debug, Clone)]
pub enum ClusterSource {
    /// Fixed array loaded from a snapshot.
    Snapshot(DirectionArray),
    /// Online accumulator, updated out-of-band.
    Online(OnlineCluster),
}

/// Raw (un-normalized) direction prototypes plus their provenance.
#[derive(Debug, Clone)]
pub struct DirectionClusterStore {
    source: ClusterSource,
    path: PathBuf,
    episode: String,
    directions_init: bool,
}

impl DirectionClusterStore {
    /// Load the snapshot for the current episode, or start an accumulator.
    ///
    /// With `config.resume`, the episode comes from the checkpoint state in
    /// `<load_from>/models`; a missing or unreadable state is an error.
    pub fn load_or_init(config: &OptionCriticConfig) -> Result<Self> {
        let episode = if config.resume {
            resume_episode(&config.load_from)?
        } else {
            INITIAL_EPISODE.to_string()
        };

        let path = snapshot_path(&config.logdir, &episode);
        let (nb_options, dim) = (config.nb_options, config.goal_embedding_size());

        if path.exists() {
            let array = load_snapshot(&path)?;
            array.ensure_shape(nb_options, dim)?;
            log::info!("Loaded direction clusters from {}", path.display());
            Ok(Self {
                source: ClusterSource::Snapshot(array),
                path,
                episode,
                directions_init: true,
            })
        } else {
            log::warn!(
                "No direction cluster snapshot at {}; using online clustering ({} clusters, capacity {})",
                path.display(),
                nb_options,
                config.max_clusters
            );
            Ok(Self::online(
                OnlineCluster::new(config.max_clusters, nb_options, dim),
                path,
                episode,
            ))
        }
    }

    /// Store backed by a fixed array.
    pub fn from_array(array: DirectionArray) -> Self {
        Self {
            source: ClusterSource::Snapshot(array),
            path: PathBuf::new(),
            episode: INITIAL_EPISODE.to_string(),
            directions_init: true,
        }
    }

    fn online(cluster: OnlineCluster, path: PathBuf, episode: String) -> Self {
        Self {
            source: ClusterSource::Online(cluster),
            path,
            episode,
            directions_init: false,
        }
    }

    /// Current (K, D) prototypes.
    pub fn directions(&self) -> DirectionArray {
        match &self.source {
            ClusterSource::Snapshot(array) => array.clone(),
            ClusterSource::Online(cluster) => cluster.centers(),
        }
    }

    /// Feed a point to the accumulator.
    ///
    /// Returns `false` (and ignores the point) for snapshot-backed stores.
    pub fn observe(&mut self, point: &[f32]) -> Result<bool> {
        match &mut self.source {
            ClusterSource::Snapshot(_) => Ok(false),
            ClusterSource::Online(cluster) => {
                cluster.observe(point)?;
                Ok(true)
            }
        }
    }

    /// Write the current prototypes to `<logdir>/cluster_models/` for `episode`.
    pub fn persist(&self, logdir: impl AsRef<Path>, episode: &str) -> Result<PathBuf> {
        let path = snapshot_path(logdir, episode);
        save_snapshot(&path, &self.directions())?;
        Ok(path)
    }

    /// Whether the prototypes were loaded from a snapshot.
    pub fn directions_init(&self) -> bool {
        self.directions_init
    }

    /// Snapshot path checked at construction.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn episode(&self) -> &str {
        &self.episode
    }

    pub fn source(&self) -> &ClusterSource {
        &self.source
    }

    /// Move into a shared owner.
    pub fn share(self) -> SharedClusterStore {
        Arc::new(RwLock::new(self))
    }
}

/// Episode of the latest model checkpoint in `<load_from>/models`.
fn resume_episode(load_from: &Path) -> Result<String> {
    let dir = load_from.join("models");
    let state = CheckpointState::read(&dir).map_err(|e| OptionCriticError::Resume {
        dir: dir.clone(),
        reason: e.to_string(),
    })?;
    state.episode_token().ok_or_else(|| OptionCriticError::Resume {
        dir,
        reason: format!(
            "no episode in checkpoint path {}",
            state.model_checkpoint_path.display()
        ),
    })
}

/// Strong owner of a cluster store.
pub type SharedClusterStore = Arc<RwLock<DirectionClusterStore>>;

/// Read-only weak handle held by worker replicas.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    inner: Weak<RwLock<DirectionClusterStore>>,
}

impl ClusterHandle {
    pub fn new(owner: &SharedClusterStore) -> Self {
        Self {
            inner: Arc::downgrade(owner),
        }
    }

    /// Current prototypes, if the owner is still alive.
    pub fn snapshot(&self) -> Result<DirectionArray> {
        match self.inner.upgrade() {
            Some(store) => Ok(store.read().directions()),
            None => {
                log::warn!("Direction cluster owner dropped");
                Err(OptionCriticError::ClusterOwnerDropped)
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
