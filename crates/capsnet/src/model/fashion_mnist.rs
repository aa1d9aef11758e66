use burn::config::Config;
use burn::module::Module;
use burn::nn::{BatchNorm, BatchNormConfig, Relu};
use burn::tensor::{backend::Backend, Tensor};

use crate::capsule::{CapsuleConv2d, CapsuleConv2dConfig, CapsuleLinear, CapsuleLinearConfig};
use crate::error::CapsNetError;
use crate::shape::conv_output_size_2d;

/// Configuration to create a [FashionMnistCapsuleNet] using the
/// [init function](FashionMnistCapsuleNetConfig::init).
#[derive(Config, Debug)]
pub struct FashionMnistCapsuleNetConfig {
    /// Whether the capsule layers use dynamic routing.
    #[config(default = false)]
    pub with_routing: bool,
    /// The number of dynamic routing iterations.
    #[config(default = 3)]
    pub num_iterations: usize,
    /// The height and width of the input images.
    #[config(default = 28)]
    pub image_size: usize,
    /// The number of classes.
    #[config(default = 10)]
    pub num_classes: usize,
    /// The length of the capsules fed to and produced by the classifier.
    #[config(default = 8)]
    pub out_length: usize,
}

/// Capsule convolution followed by batch normalization and a ReLU.
#[derive(Module, Debug)]
pub struct CapsuleConvBlock<B: Backend> {
    conv: CapsuleConv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> CapsuleConvBlock<B> {
    fn new(config: &CapsuleConv2dConfig, device: &B::Device) -> Self {
        Self {
            conv: config.init(device),
            norm: BatchNormConfig::new(config.channels[1]).init(device),
            activation: Relu::new(),
        }
    }

    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, channels_in, height_in, width_in]`
    /// - output: `[batch_size, channels_out, height_out, width_out]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

        self.activation.forward(x)
    }
}

/// Capsule network for 28x28 grayscale images such as Fashion-MNIST.
///
/// Three capsule convolutions extract features, the resulting channels are regrouped into
/// capsules and classified by a capsule linear layer. The class scores are the sums of the
/// components of each class capsule; no final activation is applied.
#[derive(Module, Debug)]
pub struct FashionMnistCapsuleNet<B: Backend> {
    features: Vec<CapsuleConvBlock<B>>,
    classifier: CapsuleLinear<B>,
    out_length: usize,
}

impl FashionMnistCapsuleNetConfig {
    /// The configurations of the feature extraction stages, in order.
    pub fn feature_blocks(&self) -> [CapsuleConv2dConfig; 3] {
        let capsule_conv = |channels, kernel_size, lengths| {
            CapsuleConv2dConfig::new(channels, [kernel_size, kernel_size], lengths)
                .with_with_routing(self.with_routing)
                .with_num_iterations(self.num_iterations)
        };

        [
            capsule_conv([1, 32], 7, [1, 4]).with_padding([3, 3]),
            capsule_conv([32, 64], 5, [4, 8])
                .with_stride([2, 2])
                .with_padding([2, 2]),
            capsule_conv([64, 64], 3, [8, self.out_length])
                .with_stride([2, 2])
                .with_padding([1, 1]),
        ]
    }

    /// The height and width of the feature maps fed to the classifier.
    pub fn feature_size(&self) -> Result<[usize; 2], CapsNetError> {
        self.feature_blocks()
            .iter()
            .try_fold([self.image_size, self.image_size], |size, block| {
                conv_output_size_2d(
                    size,
                    block.kernel_size,
                    block.stride,
                    block.padding,
                    block.dilation,
                )
            })
            .ok_or_else(|| {
                CapsNetError::invalid(format!(
                    "{0}x{0} images are too small for the feature extractor",
                    self.image_size
                ))
            })
    }

    /// The number of capsules fed to the classifier: `height * width * channels / out_length`.
    ///
    /// With the default 28x28 images the features are 7x7, which gives `7 * 7 * 64 / 8 = 392`.
    pub fn num_capsules(&self) -> Result<usize, CapsNetError> {
        let [height, width] = self.feature_size()?;
        let channels = self.feature_blocks()[2].channels[1];

        Ok(height * width * channels / self.out_length)
    }

    /// The configuration of the classifier.
    pub fn classifier(&self) -> Result<CapsuleLinearConfig, CapsNetError> {
        Ok(CapsuleLinearConfig::new(
            self.num_capsules()?,
            self.num_classes,
            self.out_length,
            self.out_length,
        )
        .with_with_routing(self.with_routing)
        .with_num_iterations(self.num_iterations))
    }

    /// Checks every stage and the classifier.
    pub fn validate(&self) -> Result<(), CapsNetError> {
        if self.num_classes == 0 {
            return Err(CapsNetError::invalid("num_classes must be positive"));
        }

        self.feature_blocks()
            .iter()
            .try_for_each(CapsuleConv2dConfig::validate)?;
        self.classifier()?.validate()
    }

    /// Initialize a new [FashionMnistCapsuleNet].
    ///
    /// # Panics
    ///
    /// When the configuration doesn't [validate](FashionMnistCapsuleNetConfig::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> FashionMnistCapsuleNet<B> {
        let classifier = match self.validate().and_then(|_| self.classifier()) {
            Ok(classifier) => classifier,
            Err(err) => panic!("{err}"),
        };

        let features = self
            .feature_blocks()
            .iter()
            .map(|block| CapsuleConvBlock::new(block, device))
            .collect();

        let model = FashionMnistCapsuleNet {
            features,
            classifier: classifier.init(device),
            out_length: self.out_length,
        };

        log::debug!(
            "Initialized FashionMnistCapsuleNet (routing: {}) with {} parameters",
            self.with_routing,
            model.num_params()
        );

        model
    }
}

impl<B: Backend> FashionMnistCapsuleNet<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, 1, image_size, image_size]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for block in self.features.iter() {
            x = block.forward(x);
        }

        let [batch_size, channels, height, width] = x.dims();
        let capsules = x
            .reshape([batch_size, channels, height * width])
            .swap_dims(1, 2)
            .reshape([
                batch_size,
                height * width * channels / self.out_length,
                self.out_length,
            ]);

        let classes = self.classifier.forward(capsules);

        classes.sum_dim(2).squeeze(2)
    }

    /// The number of capsules the classifier takes as input.
    pub fn num_capsules(&self) -> usize {
        self.classifier.weight.val().dims()[0]
    }
}
