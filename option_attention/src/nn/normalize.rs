//! Normalization and distance primitives shared by the attention selector and
//! the loss terms.
//!
//! Two L2 normalizations are provided:
//!
//! - [`l2_normalize`]: the standard form, `x / sqrt(max(Σx², 1e-12))`. Used on
//!   the raw cluster prototypes.
//! - [`floored_l2_normalize`]: `max(x, 1e-8) / max(‖x‖, 1e-8)`. The numerator is
//!   floored elementwise, so negative components collapse to `1e-8` before the
//!   division. Used on the query direction, the selected option direction and
//!   inside [`cosine_similarity`].

use burn::prelude::*;

/// Floor applied by [`floored_l2_normalize`] to both numerator and norm.
pub const NORM_EPS: f32 = 1e-8;

/// Floor applied to the squared norm by [`l2_normalize`].
pub const SQUARED_NORM_EPS: f32 = 1e-12;

/// Standard L2 normalization along `dim`.
pub fn l2_normalize<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let squared_norm = x.clone().powf_scalar(2.0).sum_dim(dim);
    x / squared_norm.clamp_min(SQUARED_NORM_EPS).sqrt()
}

/// L2 normalization along `dim` with an elementwise floor on the numerator.
///
/// For inputs with non-negative components this is a regular unit-norm
/// projection. Components below `1e-8` (including all negative ones) are
/// replaced by `1e-8`, so the result of a vector with negative entries has
/// norm below 1.
pub fn floored_l2_normalize<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    dim: usize,
) -> Tensor<B, D> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(dim).sqrt();
    x.clamp_min(NORM_EPS) / norm.clamp_min(NORM_EPS)
}

/// Pairwise cosine similarity between the rows of `v1` [N, D] and `v2` [M, D].
///
/// Both sides go through [`floored_l2_normalize`]. Returns [N, M].
pub fn cosine_similarity<B: Backend>(v1: Tensor<B, 2>, v2: Tensor<B, 2>) -> Tensor<B, 2> {
    let v1 = floored_l2_normalize(v1, 1);
    let v2 = floored_l2_normalize(v2, 1);
    v1.matmul(v2.transpose())
}

/// Elementwise Huber loss with threshold `delta`.
///
/// ```text
/// huber(x) = 0.5 x²                  if |x| < delta
///          = delta (|x| - delta / 2)  otherwise
/// ```
pub fn huber_loss<B: Backend, const D: usize>(x: Tensor<B, D>, delta: f32) -> Tensor<B, D> {
    let abs = x.clone().abs();
    let quadratic = x.powf_scalar(2.0).mul_scalar(0.5);
    let linear = abs.clone().sub_scalar(0.5 * delta).mul_scalar(delta);
    quadratic.mask_where(abs.greater_equal_elem(delta), linear)
}
