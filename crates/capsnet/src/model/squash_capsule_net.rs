use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig, PaddingConfig2d};
use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor};

use crate::error::CapsNetError;
use crate::squash::squash_chunks;

/// Configuration to create a [SquashCapsuleNet] using the
/// [init function](SquashCapsuleNetConfig::init).
#[derive(Config, Debug)]
pub struct SquashCapsuleNetConfig {
    /// The number of channels of the input images.
    pub in_channels: usize,
    /// The number of classes.
    pub num_class: usize,
    /// The negative slope of the leaky ReLU activations.
    #[config(default = 0.2)]
    pub negative_slope: f64,
}

/// Configuration of a [SquashConvBlock].
#[derive(Config, Debug)]
pub struct SquashConvBlockConfig {
    /// The number of input and output channels.
    pub channels: [usize; 2],
    /// The number of groups of the convolution.
    pub groups: usize,
    /// The number of capsule groups the output channels are squashed in.
    pub capsule_groups: usize,
    /// The size of the square kernel.
    #[config(default = 3)]
    pub kernel_size: usize,
    /// Spacing between kernel elements.
    #[config(default = 3)]
    pub dilation: usize,
}

/// Grouped dilated convolution, followed by batch normalization and a squash of every capsule
/// group of the output channels.
#[derive(Module, Debug)]
pub struct SquashConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    capsule_groups: usize,
}

/// Convolutional network whose middle stages treat groups of channels as capsules.
///
/// All the stages keep the spatial size of the input. The last convolution produces
/// `in_channels * num_class` channels that are averaged per class into independent class
/// probabilities.
#[derive(Module, Debug)]
pub struct SquashCapsuleNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    block3: SquashConvBlock<B>,
    block4: SquashConvBlock<B>,
    block5: SquashConvBlock<B>,
    conv6: Conv2d<B>,
    conv7: Conv2d<B>,
    activation: LeakyRelu,
    num_class: usize,
}

impl SquashConvBlockConfig {
    /// Checks that the convolution groups and the capsule groups divide the channels.
    pub fn validate(&self) -> Result<(), CapsNetError> {
        let [channels_in, channels_out] = self.channels;

        if self.groups == 0 || channels_in % self.groups != 0 || channels_out % self.groups != 0 {
            return Err(CapsNetError::invalid(format!(
                "channels {:?} can't be split into {} convolution groups",
                self.channels, self.groups
            )));
        }
        if self.capsule_groups == 0 || channels_out % self.capsule_groups != 0 {
            return Err(CapsNetError::invalid(format!(
                "{channels_out} channels can't be split into {} capsule groups",
                self.capsule_groups
            )));
        }
        if self.kernel_size == 0 || self.dilation == 0 {
            return Err(CapsNetError::invalid(
                "kernel size and dilation must be positive",
            ));
        }

        Ok(())
    }

    /// Initialize a new [SquashConvBlock].
    ///
    /// The padding is chosen so that the spatial size is preserved.
    ///
    /// # Panics
    ///
    /// When the configuration doesn't [validate](SquashConvBlockConfig::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> SquashConvBlock<B> {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }

        let padding = self.dilation * (self.kernel_size - 1) / 2;
        let conv = Conv2dConfig::new(self.channels, [self.kernel_size, self.kernel_size])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_dilation([self.dilation, self.dilation])
            .with_groups(self.groups)
            .init(device);

        SquashConvBlock {
            conv,
            norm: BatchNormConfig::new(self.channels[1]).init(device),
            capsule_groups: self.capsule_groups,
        }
    }
}

impl<B: Backend> SquashConvBlock<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, channels_in, height, width]`
    /// - output: `[batch_size, channels_out, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

        squash_chunks(x, self.capsule_groups, 1)
    }
}

impl SquashCapsuleNetConfig {
    /// The configurations of the three capsule stages, in order.
    pub fn capsule_blocks(&self) -> [SquashConvBlockConfig; 3] {
        [
            SquashConvBlockConfig::new([256, 512], 4, 4),
            SquashConvBlockConfig::new([512, 512], 16, 16),
            SquashConvBlockConfig::new([512, 256], 4, 4),
        ]
    }

    /// Checks the class and channel counts and every capsule stage.
    pub fn validate(&self) -> Result<(), CapsNetError> {
        if self.in_channels == 0 {
            return Err(CapsNetError::invalid("in_channels must be positive"));
        }
        if self.num_class == 0 {
            return Err(CapsNetError::invalid("num_class must be positive"));
        }
        if !self.negative_slope.is_finite() {
            return Err(CapsNetError::invalid("negative_slope must be finite"));
        }

        self.capsule_blocks()
            .iter()
            .try_for_each(SquashConvBlockConfig::validate)
    }

    /// Initialize a new [SquashCapsuleNet].
    ///
    /// # Panics
    ///
    /// When the configuration doesn't [validate](SquashCapsuleNetConfig::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> SquashCapsuleNet<B> {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }

        let [block3, block4, block5] = self.capsule_blocks().map(|block| block.init(device));
        let conv_7x7 = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [7, 7])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .init(device)
        };
        let conv_5x5_dilated = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [5, 5])
                .with_padding(PaddingConfig2d::Explicit(4, 4))
                .with_dilation([2, 2])
                .init(device)
        };

        let model = SquashCapsuleNet {
            conv1: conv_7x7([self.in_channels, 128]),
            conv2: conv_5x5_dilated([128, 256]),
            block3,
            block4,
            block5,
            conv6: conv_5x5_dilated([256, 128]),
            conv7: conv_7x7([128, self.in_channels * self.num_class]),
            activation: LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init(),
            num_class: self.num_class,
        };

        log::debug!(
            "Initialized SquashCapsuleNet with {} parameters",
            model.num_params()
        );

        model
    }
}

impl<B: Backend> SquashCapsuleNet<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// Returns one independent probability per class, in `(0, 1)`.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, in_channels, height, width]`
    /// - output: `[batch_size, num_class]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(input));
        let x = self.activation.forward(self.conv2.forward(x));

        let x = self.block3.forward(x);
        let x = self.block4.forward(x);
        let x = self.block5.forward(x);

        let x = self.activation.forward(self.conv6.forward(x));
        let x = self.activation.forward(self.conv7.forward(x));

        let [batch_size, channels, height, width] = x.dims();
        let x = x
            .reshape([
                batch_size,
                self.num_class,
                channels / self.num_class * height * width,
            ])
            .mean_dim(2)
            .squeeze(2);

        sigmoid(x)
    }

    /// The number of classes.
    pub fn num_class(&self) -> usize {
        self.num_class
    }
}
