use std::path::Path;

use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;

use crate::error::CapsNetError;
use crate::model::{
    FashionMnistCapsuleNet, FashionMnistCapsuleNetConfig, SquashCapsuleNet,
    SquashCapsuleNetConfig,
};

/// Name of the config file inside an artifact directory.
pub const CONFIG_FILE: &str = "config.json";

/// File stem of the model record inside an artifact directory.
pub const MODEL_FILE: &str = "model";

/// Records keep full precision so that a reloaded model reproduces the saved one exactly.
type ArtifactRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// A config that can rebuild the model it describes.
pub trait ModelArtifact<B: Backend>: Config {
    /// The model built from the config.
    type Model: Module<B>;

    /// Initialize a fresh model, ready to receive a saved record.
    fn init_model(&self, device: &B::Device) -> Self::Model;
}

impl<B: Backend> ModelArtifact<B> for SquashCapsuleNetConfig {
    type Model = SquashCapsuleNet<B>;

    fn init_model(&self, device: &B::Device) -> Self::Model {
        self.init(device)
    }
}

impl<B: Backend> ModelArtifact<B> for FashionMnistCapsuleNetConfig {
    type Model = FashionMnistCapsuleNet<B>;

    fn init_model(&self, device: &B::Device) -> Self::Model {
        self.init(device)
    }
}

/// Saves the config and the model record into `artifact_dir`, creating it if needed.
pub fn save_artifacts<B, C>(
    artifact_dir: &Path,
    config: &C,
    model: C::Model,
) -> Result<(), CapsNetError>
where
    B: Backend,
    C: ModelArtifact<B>,
{
    std::fs::create_dir_all(artifact_dir)?;

    config.save(artifact_dir.join(CONFIG_FILE))?;
    model.save_file(artifact_dir.join(MODEL_FILE), &ArtifactRecorder::new())?;

    log::info!("Saved model artifacts to {}", artifact_dir.display());

    Ok(())
}

/// Loads the config saved in `artifact_dir`, initializes its model and loads the saved record
/// into it.
pub fn load_artifacts<B, C>(
    artifact_dir: &Path,
    device: &B::Device,
) -> Result<(C, C::Model), CapsNetError>
where
    B: Backend,
    C: ModelArtifact<B>,
{
    let config = C::load(artifact_dir.join(CONFIG_FILE))?;
    let model = config.init_model(device).load_file(
        artifact_dir.join(MODEL_FILE),
        &ArtifactRecorder::new(),
        device,
    )?;

    log::info!("Loaded model artifacts from {}", artifact_dir.display());

    Ok((config, model))
}
