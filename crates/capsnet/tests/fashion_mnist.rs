//! Integration tests of the Fashion-MNIST capsule network and its classifier.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use capsnet::capsule::CapsuleLinearConfig;
use capsnet::model::FashionMnistCapsuleNetConfig;

pub type TestBackend = NdArray<f32>;

#[test]
fn classifier_input_capsules() {
    let config = FashionMnistCapsuleNetConfig::new();
    let classifier: CapsuleLinearConfig = config.classifier().unwrap();

    assert_eq!(classifier.in_capsules, 7 * 7 * 64 / 8);
    assert_eq!(classifier.in_capsules, 392);
    assert_eq!(classifier.out_capsules, 10);
    assert_eq!(classifier.in_length, 8);
    assert_eq!(classifier.out_length, 8);
    assert!(!classifier.with_routing);
}

#[test]
fn routing_flag_reaches_every_capsule_layer() {
    let config = FashionMnistCapsuleNetConfig::new().with_with_routing(true);

    assert!(config.feature_blocks().iter().all(|block| block.with_routing));
    assert!(config.classifier().unwrap().with_routing);
}

#[test]
fn batch_of_28x28_images_gives_ten_scores() {
    let device = Default::default();
    let model = FashionMnistCapsuleNetConfig::new().init::<TestBackend>(&device);

    for batch_size in [1, 4] {
        let input = Tensor::<TestBackend, 4>::random(
            [batch_size, 1, 28, 28],
            Distribution::Default,
            &device,
        );

        assert_eq!(model.forward(input).dims(), [batch_size, 10]);
    }
}
