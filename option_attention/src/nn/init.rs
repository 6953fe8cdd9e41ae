//! Column-normalized initialization.
//!
//! Draws a Gaussian matrix and rescales every column to L2 norm `std`. Used
//! for raw weight matrices that are multiplied directly (no `Linear` wrapper),
//! such as the mixed-value embedding.
//!
//! ```text
//! W[:, j] = std * g_j / ‖g_j‖,   g_j ~ N(0, I)
//! ```

use burn::prelude::*;
use burn::tensor::Distribution;

/// Generate a [rows, cols] matrix whose columns each have L2 norm `std`.
pub fn normalized_columns_weights<B: Backend>(
    rows: usize,
    cols: usize,
    std: f64,
    device: &B::Device,
) -> Tensor<B, 2> {
    let random = Tensor::<B, 2>::random([rows, cols], Distribution::Normal(0.0, 1.0), device);

    // [1, cols] column norms
    let norms = random.clone().powf_scalar(2.0).sum_dim(0).sqrt();

    random.mul_scalar(std as f32) / norms.clamp_min(1e-10)
}
