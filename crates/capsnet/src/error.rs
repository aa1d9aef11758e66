use burn::config::ConfigError;
use burn::record::RecorderError;

/// Errors returned when building, saving or loading capsule models.
#[derive(thiserror::Error, Debug)]
pub enum CapsNetError {
    /// A configuration describes an architecture that can't be built.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The config file could not be read or parsed.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The model record could not be saved or loaded.
    #[error("Record error: {0}")]
    Record(#[from] RecorderError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapsNetError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
