use std::path::PathBuf;

use thiserror::Error;

/// Library error type for backdrop operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Both the requested image and the configured fallback failed to decode.
    #[error("failed to load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// The quantizer or weighting stage produced no usable data.
    #[error("color extraction failed: {0}")]
    Extraction(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// Rendering/display error from the preview surface.
    #[error("render error: {0}")]
    Render(anyhow::Error),
}
