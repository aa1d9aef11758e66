//! Seeded initialization and repeated forward passes give reproducible outputs.

use burn::backend::{Autodiff, NdArray};
use burn::tensor::{backend::Backend, Distribution, Tensor};
use capsnet::model::{FashionMnistCapsuleNetConfig, SquashCapsuleNetConfig};

pub type TestBackend = NdArray<f32>;
pub type TestAutodiffBackend = Autodiff<TestBackend>;

// The backend seed is global: keep every seeded test in this file, in a single test.
#[test]
fn seeded_models_produce_identical_outputs() {
    let device = Default::default();

    // Drawn before seeding so that it doesn't consume the seeded stream.
    let input = Tensor::<TestBackend, 4>::random([2, 1, 12, 12], Distribution::Default, &device);

    // Parameters are drawn lazily: run each model before the stream is reseeded.
    TestBackend::seed(42);
    let first = SquashCapsuleNetConfig::new(1, 10).init::<TestBackend>(&device);
    let first = first.forward(input.clone());

    TestBackend::seed(42);
    let second = SquashCapsuleNetConfig::new(1, 10).init::<TestBackend>(&device);
    let second = second.forward(input);

    first.into_data().assert_approx_eq(&second.into_data(), 6);

    TestBackend::seed(7);
    let first = FashionMnistCapsuleNetConfig::new()
        .with_with_routing(true)
        .init::<TestAutodiffBackend>(&device);
    let input = Tensor::<TestAutodiffBackend, 4>::random(
        [2, 1, 28, 28],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    // Batch normalization runs in training mode here; its output only depends on the batch.
    let once = first.forward(input.clone());
    let twice = first.forward(input);

    once.into_data().assert_approx_eq(&twice.into_data(), 6);
}
