use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::tensor::{backend::Backend, Tensor};

use super::predict;
use crate::error::CapsNetError;
use crate::routing::route;

/// Configuration to create a [capsule linear](CapsuleLinear) layer using the
/// [init function](CapsuleLinearConfig::init).
#[derive(Config, Debug)]
pub struct CapsuleLinearConfig {
    /// The number of input capsules.
    pub in_capsules: usize,
    /// The number of output capsules.
    pub out_capsules: usize,
    /// The length of an input capsule.
    pub in_length: usize,
    /// The length of an output capsule.
    pub out_length: usize,
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

/// Fully connected capsule layer.
///
/// Every input capsule predicts every output capsule through its own transformation matrix, the
/// predictions are then [routed](crate::routing::route) into the output capsules.
///
/// Should be created with [CapsuleLinearConfig].
#[derive(Module, Debug)]
pub struct CapsuleLinear<B: Backend> {
    /// Tensor of shape `[in_capsules, in_length, out_capsules * out_length]`.
    pub weight: Param<Tensor<B, 3>>,
    out_capsules: usize,
    out_length: usize,
    with_routing: bool,
    num_iterations: usize,
}

impl CapsuleLinearConfig {
    /// Checks that every dimension is positive.
    pub fn validate(&self) -> Result<(), CapsNetError> {
        if self.in_capsules == 0 || self.out_capsules == 0 {
            return Err(CapsNetError::invalid("capsule counts must be positive"));
        }
        if self.in_length == 0 || self.out_length == 0 {
            return Err(CapsNetError::invalid("capsule lengths must be positive"));
        }
        if self.with_routing && self.num_iterations == 0 {
            return Err(CapsNetError::invalid(
                "dynamic routing needs at least one iteration",
            ));
        }

        Ok(())
    }

    /// Initialize a new [capsule linear](CapsuleLinear) module.
    ///
    /// # Panics
    ///
    /// When the configuration doesn't [validate](CapsuleLinearConfig::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> CapsuleLinear<B> {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }

        let weight = self.initializer.init_with(
            [
                self.in_capsules,
                self.in_length,
                self.out_capsules * self.out_length,
            ],
            Some(self.in_capsules * self.in_length),
            Some(self.out_capsules * self.out_length),
            device,
        );

        CapsuleLinear {
            weight,
            out_capsules: self.out_capsules,
            out_length: self.out_length,
            with_routing: self.with_routing,
            num_iterations: self.num_iterations,
        }
    }
}

impl<B: Backend> CapsuleLinear<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, in_capsules, in_length]`
    /// - output: `[batch_size, out_capsules, out_length]`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let priors = predict(input, self.weight.val(), self.out_capsules, self.out_length);

        route(priors, self.with_routing, self.num_iterations)
    }
}
