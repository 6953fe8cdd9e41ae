//! Direction cluster prototypes.
//!
//! - [`snapshot`]: (K, D) arrays and their JSON snapshots on disk
//! - [`online`]: online clustering accumulator
//! - [`store`]: the store owned by the global replica and the weak handles
//!   held by workers

pub mod online;
pub mod snapshot;
pub mod store;

pub use online::OnlineCluster;
pub use snapshot::{
    load_snapshot, save_snapshot, snapshot_path, DirectionArray, CLUSTER_MODELS_DIR,
    SNAPSHOT_EXTENSION,
};
pub use store::{
    ClusterHandle, ClusterSource, DirectionClusterStore, SharedClusterStore, INITIAL_EPISODE,
};
