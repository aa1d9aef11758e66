use burn::tensor::{activation::softmax, backend::Backend, Tensor};

use crate::squash::squash;

/// Combines the prediction vectors of the input capsules into output capsules.
///
/// With `with_routing`, the coupling between input and output capsules is refined with
/// [dynamic routing](route_by_agreement), otherwise every input capsule contributes equally
/// ([route_uniform]).
///
/// # Shapes
///
/// - priors: `[rows, in_capsules, out_capsules, out_length]`
/// - output: `[rows, out_capsules, out_length]`
pub fn route<B: Backend>(
    priors: Tensor<B, 4>,
    with_routing: bool,
    num_iterations: usize,
) -> Tensor<B, 3> {
    if with_routing {
        route_by_agreement(priors, num_iterations)
    } else {
        route_uniform(priors)
    }
}

/// Averages the prediction vectors over the input capsules and squashes the result.
///
/// # Shapes
///
/// - priors: `[rows, in_capsules, out_capsules, out_length]`
/// - output: `[rows, out_capsules, out_length]`
pub fn route_uniform<B: Backend>(priors: Tensor<B, 4>) -> Tensor<B, 3> {
    squash(priors.mean_dim(1), 3).squeeze(1)
}

/// Dynamic routing by agreement, as described in
/// [Dynamic Routing Between Capsules](https://arxiv.org/abs/1710.09829).
///
/// The routing logits start at zero. Every iteration turns them into coupling coefficients with a
/// softmax over the output capsules, computes the squashed weighted sum of the prediction vectors
/// and raises the logits of the predictions that agree (scalar product) with the resulting output
/// capsule. The logits are not updated after the last iteration.
///
/// # Shapes
///
/// - priors: `[rows, in_capsules, out_capsules, out_length]`
/// - output: `[rows, out_capsules, out_length]`
///
/// # Panics
///
/// When `num_iterations` is zero.
pub fn route_by_agreement<B: Backend>(priors: Tensor<B, 4>, num_iterations: usize) -> Tensor<B, 3> {
    if num_iterations == 0 {
        panic!("Dynamic routing needs at least one iteration");
    }

    let [rows, in_capsules, out_capsules, _] = priors.dims();
    let mut logits = Tensor::zeros([rows, in_capsules, out_capsules, 1], &priors.device());

    for _ in 1..num_iterations {
        let outputs = weighted_squash(priors.clone(), logits.clone());
        let agreement = priors.clone().mul(outputs).sum_dim(3);

        logits = logits.add(agreement);
    }

    weighted_squash(priors, logits).squeeze(1)
}

/// Returns `[rows, 1, out_capsules, out_length]`.
fn weighted_squash<B: Backend>(priors: Tensor<B, 4>, logits: Tensor<B, 4>) -> Tensor<B, 4> {
    let coupling = softmax(logits, 2);

    squash(coupling.mul(priors).sum_dim(1), 3)
}
