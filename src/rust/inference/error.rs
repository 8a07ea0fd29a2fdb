use ort::Error as OrtError;

use crate::model_manager::ModelError;

/// Errors raised while acquiring a model or running it.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Threshold passed to a loader outside [0, 1]
    #[error("Invalid threshold {0}: must be within [0, 1]")]
    InvalidThreshold(f32),
    /// Error occurred while loading or using the tokenizer
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    /// Error occurred while running the ONNX model
    #[error("Model error: {0}")]
    Model(String),
    /// Error occurred while building a session from model files
    #[error("Load error: {0}")]
    Load(String),
    /// A blocking inference task panicked or was cancelled
    #[error("Inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Model files could not be fetched or verified
    #[error(transparent)]
    Download(#[from] ModelError),
}

impl From<OrtError> for InferenceError {
    fn from(err: OrtError) -> Self {
        InferenceError::Load(err.to_string())
    }
}
