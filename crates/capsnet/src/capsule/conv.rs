use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::tensor::module::unfold4d;
use burn::tensor::ops::UnfoldOptions;
use burn::tensor::{backend::Backend, Tensor};

use super::predict;
use crate::error::CapsNetError;
use crate::routing::route;
use crate::shape::conv_output_size_2d;

/// Configuration to create a [2D capsule convolution](CapsuleConv2d) layer using the
/// [init function](CapsuleConv2dConfig::init).
#[derive(Config, Debug)]
pub struct CapsuleConv2dConfig {
    /// The number of input and output channels.
    pub channels: [usize; 2],
    /// The size of the kernel.
    pub kernel_size: [usize; 2],
    /// The length of the input and output capsules.
    pub lengths: [usize; 2],
    /// The stride of the convolution.
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
    /// The zero padding added on both sides of the input.
    #[config(default = "[0, 0]")]
    pub padding: [usize; 2],
    /// Spacing between kernel elements.
    #[config(default = "[1, 1]")]
    pub dilation: [usize; 2],
    /// Whether the output capsules are computed with dynamic routing.
    #[config(default = false)]
    pub with_routing: bool,
    /// The number of dynamic routing iterations.
    #[config(default = 3)]
    pub num_iterations: usize,
    /// The type of function used to initialize the transformation matrices.
    #[config(
        default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}"
    )]
    pub initializer: Initializer,
}

/// Applies a 2D capsule convolution over input tensors.
///
/// The input channels are read as capsules of `in_length` consecutive channels. Every kernel
/// position of every input capsule casts a prediction for each output capsule through its own
/// transformation matrix, shared across the spatial positions. The predictions of one patch are
/// then [routed](crate::routing::route) into the output capsules, which are written back as
/// `out_length` consecutive channels each.
///
/// Should be created with [CapsuleConv2dConfig].
#[derive(Module, Debug)]
pub struct CapsuleConv2d<B: Backend> {
    /// Tensor of shape `[in_capsules * kernel_size_1 * kernel_size_2, in_length, out_channels]`.
    pub weight: Param<Tensor<B, 3>>,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
    in_length: usize,
    out_length: usize,
    out_capsules: usize,
    with_routing: bool,
    num_iterations: usize,
}

impl CapsuleConv2dConfig {
    /// Checks that the channels can be split into whole capsules.
    pub fn validate(&self) -> Result<(), CapsNetError> {
        let [channels_in, channels_out] = self.channels;
        let [length_in, length_out] = self.lengths;

        if length_in == 0 || length_out == 0 {
            return Err(CapsNetError::invalid("capsule lengths must be positive"));
        }
        if channels_in == 0 || channels_in % length_in != 0 {
            return Err(CapsNetError::invalid(format!(
                "{channels_in} input channels can't be split into capsules of length {length_in}"
            )));
        }
        if channels_out == 0 || channels_out % length_out != 0 {
            return Err(CapsNetError::invalid(format!(
                "{channels_out} output channels can't be split into capsules of length {length_out}"
            )));
        }
        if self.kernel_size.contains(&0) || self.stride.contains(&0) || self.dilation.contains(&0) {
            return Err(CapsNetError::invalid(
                "kernel size, stride and dilation must be positive",
            ));
        }
        if self.with_routing && self.num_iterations == 0 {
            return Err(CapsNetError::invalid(
                "dynamic routing needs at least one iteration",
            ));
        }

        Ok(())
    }

    /// Initialize a new [capsule convolution](CapsuleConv2d) module.
    ///
    /// # Panics
    ///
    /// When the configuration doesn't [validate](CapsuleConv2dConfig::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> CapsuleConv2d<B> {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }

        let [channels_in, channels_out] = self.channels;
        let [length_in, length_out] = self.lengths;
        let in_capsules = channels_in / length_in * self.kernel_size[0] * self.kernel_size[1];

        let weight = self.initializer.init_with(
            [in_capsules, length_in, channels_out],
            Some(in_capsules * length_in),
            Some(channels_out),
            device,
        );

        CapsuleConv2d {
            weight,
            kernel_size: self.kernel_size,
            stride: self.stride,
            padding: self.padding,
            dilation: self.dilation,
            in_length: length_in,
            out_length: length_out,
            out_capsules: channels_out / length_out,
            with_routing: self.with_routing,
            num_iterations: self.num_iterations,
        }
    }
}

impl<B: Backend> CapsuleConv2d<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, channels_in, height_in, width_in]`
    /// - output: `[batch_size, channels_out, height_out, width_out]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, channels_in, height_in, width_in] = input.dims();
        let [kernel_height, kernel_width] = self.kernel_size;
        let [height_out, width_out] = conv_output_size_2d(
            [height_in, width_in],
            self.kernel_size,
            self.stride,
            self.padding,
            self.dilation,
        )
        .unwrap_or_else(|| {
            panic!(
                "Capsule convolution kernel {:?} doesn't fit a {height_in}x{width_in} input",
                self.kernel_size
            )
        });

        let positions = height_out * width_out;
        let kernel_area = kernel_height * kernel_width;
        let in_capsules = channels_in / self.in_length;
        let channels_out = self.out_capsules * self.out_length;

        // [batch_size, channels_in * kernel_area, positions], channel-major.
        let options = UnfoldOptions {
            stride: self.stride,
            padding: self.padding,
            dilation: self.dilation,
        };
        let patches = unfold4d(input, self.kernel_size, options);
        let capsules = patches
            .reshape([batch_size, in_capsules, self.in_length, kernel_area, positions])
            .permute([0, 4, 1, 3, 2])
            .reshape([
                batch_size * positions,
                in_capsules * kernel_area,
                self.in_length,
            ]);

        let priors = predict(capsules, self.weight.val(), self.out_capsules, self.out_length);
        let outputs = route(priors, self.with_routing, self.num_iterations);

        outputs
            .reshape([batch_size, positions, channels_out])
            .swap_dims(1, 2)
            .reshape([batch_size, channels_out, height_out, width_out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::tensor::{Distribution, TensorData};

    #[test]
    fn output_shape_follows_stride_and_padding() {
        let device = Default::default();
        let layer = CapsuleConv2dConfig::new([32, 64], [5, 5], [4, 8])
            .with_stride([2, 2])
            .with_padding([2, 2])
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 32, 14, 14], Distribution::Default, &device);

        let output = layer.forward(input);

        assert_eq!(output.dims(), [2, 64, 7, 7]);
    }

    #[test]
    fn weight_shape() {
        let device = Default::default();
        let layer = CapsuleConv2dConfig::new([32, 64], [5, 5], [4, 8]).init::<TestBackend>(&device);

        assert_eq!(layer.weight.val().dims(), [8 * 25, 4, 64]);
    }

    #[test]
    fn weight_scale_follows_the_patch_size() {
        let device = Default::default();
        let layer = CapsuleConv2dConfig::new([32, 64], [5, 5], [4, 8]).init::<TestBackend>(&device);

        // Every output component reads all 32 * 25 patch values.
        let bound = 1.0 / ((32 * 25) as f32).sqrt();
        let weights = layer.weight.val().into_data().to_vec::<f32>().unwrap();

        assert!(weights.iter().all(|weight| weight.abs() <= bound * 1.0001));
        assert!(weights.iter().any(|weight| weight.abs() > bound / 2.0));
    }

    #[test]
    fn one_capsule_identity_transform() {
        let device = Default::default();
        let mut layer = CapsuleConv2dConfig::new([2, 2], [1, 1], [2, 2]).init::<TestBackend>(&device);
        layer.weight = Param::from_tensor(Tensor::from_floats([[[1.0, 0.0], [0.0, 1.0]]], &device));
        let input = Tensor::<TestBackend, 4>::from_floats([[[[3.0]], [[4.0]]]], &device);

        let output = layer.forward(input);

        // squash([3, 4]) = 25 / 26 * [3, 4] / 5
        output
            .into_data()
            .assert_approx_eq(&TensorData::from([[[[0.576923]], [[0.769231]]]]), 5);
    }

    #[test]
    fn kernel_positions_are_row_major() {
        let device = Default::default();
        let mut layer = CapsuleConv2dConfig::new([1, 1], [2, 2], [1, 1]).init::<TestBackend>(&device);
        // Only the bottom-right kernel position contributes.
        layer.weight = Param::from_tensor(Tensor::from_floats(
            [[[0.0]], [[0.0]], [[0.0]], [[4.0]]],
            &device,
        ));
        let input = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0], [3.0, 4.0]]]], &device);

        let output = layer.forward(input);

        // mean of the predictions = 4 * 4 / 4 = 4, squashed to 16 / 17.
        output
            .into_data()
            .assert_approx_eq(&TensorData::from([[[[0.941176]]]]), 5);
    }

    #[test]
    fn output_capsules_are_squashed() {
        let device = Default::default();
        let layer = CapsuleConv2dConfig::new([8, 16], [3, 3], [4, 8])
            .with_padding([1, 1])
            .with_with_routing(true)
            .init::<TestBackend>(&device);
        let input =
            Tensor::<TestBackend, 4>::random([1, 8, 5, 5], Distribution::Normal(0.0, 1.0), &device);

        let norms = layer
            .forward(input)
            .reshape([1, 2, 8, 5, 5])
            .powf_scalar(2.0)
            .sum_dim(2)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(norms.len(), 2 * 25);
        assert!(norms.iter().all(|norm| (0.0..1.0).contains(norm)));
    }

    #[test]
    fn gradients_reach_the_weight() {
        let device = Default::default();
        let layer = CapsuleConv2dConfig::new([4, 8], [3, 3], [2, 4])
            .with_with_routing(true)
            .init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 4>::random(
            [2, 4, 4, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let grads = layer.forward(input).sum().backward();
        let grad = layer.weight.val().grad(&grads).unwrap();

        assert_eq!(grad.dims(), [2 * 9, 2, 8]);
    }

    #[test]
    fn invalid_capsule_length() {
        let result = CapsuleConv2dConfig::new([10, 8], [3, 3], [4, 8]).validate();

        assert!(matches!(result, Err(CapsNetError::InvalidConfig(_))));
    }

    #[test]
    #[should_panic(expected = "can't be split into capsules")]
    fn init_rejects_invalid_config() {
        let device = Default::default();
        CapsuleConv2dConfig::new([4, 10], [3, 3], [2, 4]).init::<TestBackend>(&device);
    }
}
