#![recursion_limit = "256"]

//! Capsule networks for image classification, built on Burn.
//!
//! Two architectures are provided:
//!
//! - [SquashCapsuleNet](model::SquashCapsuleNet): a dilated convolution stack whose middle
//!   stages squash groups of channels as capsules.
//! - [FashionMnistCapsuleNet](model::FashionMnistCapsuleNet): capsule convolutions followed by a
//!   capsule linear classifier, optionally with dynamic routing.
//!
//! Both are generic over the [backend](burn::tensor::backend::Backend) and are differentiable
//! when used with an autodiff backend.

/// Error type.
pub mod error;

/// Capsule layers.
pub mod capsule;

/// Model architectures.
pub mod model;

/// Routing between capsule layers.
pub mod routing;

/// Convolution output size arithmetic.
pub mod shape;

/// Squash nonlinearity.
pub mod squash;

/// Persistence of configs and model records.
pub mod artifact;

pub use error::CapsNetError;
pub use squash::{squash, squash_chunks};

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

/// Backend for autodiff test cases
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

pub mod prelude {
    //! Structs and functions used by most users of the crate.
    pub use crate::{
        artifact::{load_artifacts, save_artifacts, ModelArtifact},
        capsule::{CapsuleConv2d, CapsuleConv2dConfig, CapsuleLinear, CapsuleLinearConfig},
        error::CapsNetError,
        model::{
            FashionMnistCapsuleNet, FashionMnistCapsuleNetConfig, SquashCapsuleNet,
            SquashCapsuleNetConfig,
        },
        squash::{squash, squash_chunks},
    };
}
