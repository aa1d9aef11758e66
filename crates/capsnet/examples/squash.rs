//! Squashes a small tensor and runs both capsule networks on random images.

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::module::Module;
use burn::tensor::{Distribution, Tensor};
use capsnet::model::{FashionMnistCapsuleNetConfig, SquashCapsuleNetConfig};
use capsnet::squash;

type Backend = NdArray<f32>;

fn main() {
    let device = NdArrayDevice::Cpu;

    let tensor = Tensor::<Backend, 2>::from_floats([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]], &device);
    println!("squash: {}", squash(tensor, 1));

    let config = SquashCapsuleNetConfig::new(1, 10);
    let model = config.init::<Backend>(&device);
    println!("SquashCapsuleNet {config}");
    println!("Parameters: {}", model.num_params());

    let images = Tensor::<Backend, 4>::random([2, 1, 28, 28], Distribution::Default, &device);
    println!("Class probabilities: {}", model.forward(images.clone()));

    for with_routing in [false, true] {
        let config = FashionMnistCapsuleNetConfig::new().with_with_routing(with_routing);
        let model = config.init::<Backend>(&device);

        println!(
            "FashionMnistCapsuleNet (routing: {with_routing}, {} parameters, {} capsules)",
            model.num_params(),
            model.num_capsules()
        );
        println!("Class scores: {}", model.forward(images.clone()));
    }
}
