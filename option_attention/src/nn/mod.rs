//! Neural network utilities for the option-critic network.
//!
//! # Modules
//!
//! - [`normalize`]: L2 normalizations, pairwise cosine similarity, Huber loss
//! - [`init`]: Column-normalized weight initialization
//! - [`attention`]: Soft selection over direction prototypes

pub mod normalize;
pub mod init;
pub mod attention;

pub use normalize::{cosine_similarity, floored_l2_normalize, huber_loss, l2_normalize};
pub use init::normalized_columns_weights;
pub use attention::{select_direction, AttentionOutput};
