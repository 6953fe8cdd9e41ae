//! Attention over direction prototypes.
//!
//! Maps a per-state query direction onto a soft combination of the K cluster
//! directions:
//!
//! ```text
//! C̄         = l2_normalize(C)                     [K, D]
//! q         = floored_l2_normalize(query)         [N, D]
//! match     = q C̄ᵀ                                [N, K]
//! weights   = softmax(match, K)                   [N, K]
//! direction = floored_l2_normalize(weights C̄)     [N, D]
//! ```
//!
//! Both sides are unit-norm, so `match` is a cosine similarity and no
//! `1/sqrt(d)` scaling is applied. The selector has no parameters; the query
//! projection lives in the feature backbone.

use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::normalize::{floored_l2_normalize, l2_normalize};

/// Output of the direction attention.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// Unit-norm cluster prototypes [K, D]
    pub normalized_clusters: Tensor<B, 2>,
    /// Normalized query direction [N, D]
    pub query_direction: Tensor<B, 2>,
    /// Cosine match between query and each cluster [N, K]
    pub query_content_match: Tensor<B, 2>,
    /// Softmax over clusters [N, K]
    pub attention_weights: Tensor<B, 2>,
    /// Convex combination of clusters before renormalization [N, D]
    pub unnormalized_direction: Tensor<B, 2>,
    /// Selected option direction [N, D]
    pub current_option_direction: Tensor<B, 2>,
}

/// Select the current option direction for each query.
///
/// # Arguments
/// * `direction_features` - Raw query projection [N, D], any scale
/// * `direction_clusters` - Raw cluster prototypes [K, D], any scale
///
/// # Panics
/// If the embedding sizes of the two inputs differ.
pub fn select_direction<B: Backend>(
    direction_features: Tensor<B, 2>,
    direction_clusters: Tensor<B, 2>,
) -> AttentionOutput<B> {
    let [_, d_query] = direction_features.dims();
    let [_, d_clusters] = direction_clusters.dims();
    assert_eq!(
        d_query, d_clusters,
        "query embedding size ({}) must match cluster embedding size ({})",
        d_query, d_clusters
    );

    let normalized_clusters = l2_normalize(direction_clusters, 1);
    let query_direction = floored_l2_normalize(direction_features, 1);

    let query_content_match = query_direction
        .clone()
        .matmul(normalized_clusters.clone().transpose());
    let attention_weights = softmax(query_content_match.clone(), 1);

    let unnormalized_direction = attention_weights.clone().matmul(normalized_clusters.clone());
    let current_option_direction = floored_l2_normalize(unnormalized_direction.clone(), 1);

    AttentionOutput {
        normalized_clusters,
        query_direction,
        query_content_match,
        attention_weights,
        unnormalized_direction,
        current_option_direction,
    }
}
