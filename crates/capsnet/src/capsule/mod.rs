mod conv;
mod linear;

pub use conv::*;
pub use linear::*;

use burn::tensor::{backend::Backend, Tensor};

/// Computes the prediction vectors ("priors") every input capsule casts for every output capsule.
///
/// Each input capsule owns one `in_length x (out_capsules * out_length)` matrix.
///
/// # Shapes
///
/// - capsules: `[rows, in_capsules, in_length]`
/// - weight: `[in_capsules, in_length, out_capsules * out_length]`
/// - output: `[rows, in_capsules, out_capsules, out_length]`
pub(crate) fn predict<B: Backend>(
    capsules: Tensor<B, 3>,
    weight: Tensor<B, 3>,
    out_capsules: usize,
    out_length: usize,
) -> Tensor<B, 4> {
    let [rows, in_capsules, _] = capsules.dims();

    capsules
        .swap_dims(0, 1)
        .matmul(weight)
        .swap_dims(0, 1)
        .reshape([rows, in_capsules, out_capsules, out_length])
}
