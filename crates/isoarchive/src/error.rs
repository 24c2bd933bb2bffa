use manifest::ManifestError;

use crate::config::ConfigError;

/// Startup and shutdown failures of the server process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to send server shutdown signal")]
    Shutdown,
}

pub type ServerResult<T> = Result<T, ServerError>;
