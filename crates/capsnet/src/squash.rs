use burn::tensor::{backend::Backend, Tensor};

/// Added to the squared norm before taking its square root, so that a zero capsule squashes to
/// zero instead of NaN.
pub const SQUASH_EPSILON: f64 = 1e-8;

/// Applies the squash nonlinearity along a dimension.
///
/// Each vector along `dim` is rescaled so that its length lands in `[0, 1)` while its orientation
/// is kept:
///
/// `squash(s) = |s|² / (1 + |s|²) * s / |s|`
///
/// Short vectors shrink to almost zero and long vectors get a length slightly below one.
///
/// # Shapes
///
/// - tensor: `[..., dim, ...]`
/// - output: same as the input
pub fn squash<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let squared_norm = tensor.clone().powf_scalar(2.0).sum_dim(dim);
    let scale = squared_norm
        .clone()
        .div(squared_norm.clone().add_scalar(1.0));
    let norm = squared_norm.add_scalar(SQUASH_EPSILON).sqrt();

    tensor.mul(scale.div(norm))
}

/// Splits `dim` into `chunks` equal capsule groups, squashes every group independently along
/// `dim` and concatenates the groups back in their original order.
///
/// # Panics
///
/// When the size of `dim` isn't a multiple of `chunks`.
pub fn squash_chunks<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    chunks: usize,
    dim: usize,
) -> Tensor<B, D> {
    let size = tensor.dims()[dim];

    if chunks == 0 || size % chunks != 0 {
        panic!("Can't split {size} channels into {chunks} capsule groups of equal length");
    }

    let capsules = tensor
        .chunk(chunks, dim)
        .into_iter()
        .map(|capsule| squash(capsule, dim))
        .collect();

    Tensor::cat(capsules, dim)
}
