//! Error types for model loading and recognition

use std::fmt;

/// Errors that can occur while loading the model or recognizing a digit
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// Network, I/O or format failure while loading the model
    ModelLoad(String),

    /// Recognition requested without a model or without a drawing
    InvalidInvocation(String),

    /// Malformed raster data
    InvalidInput(String),

    /// Shape mismatch while evaluating the model
    Inference(String),
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::ModelLoad(msg) => write!(f, "Model load error: {}", msg),
            RecognitionError::InvalidInvocation(msg) => write!(f, "Invalid invocation: {}", msg),
            RecognitionError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            RecognitionError::Inference(msg) => write!(f, "Inference error: {}", msg),
        }
    }
}

impl std::error::Error for RecognitionError {}

impl From<std::io::Error> for RecognitionError {
    fn from(e: std::io::Error) -> Self {
        RecognitionError::ModelLoad(e.to_string())
    }
}

impl From<serde_json::Error> for RecognitionError {
    fn from(e: serde_json::Error) -> Self {
        RecognitionError::ModelLoad(format!("invalid model.json: {e}"))
    }
}

impl From<reqwest::Error> for RecognitionError {
    fn from(e: reqwest::Error) -> Self {
        RecognitionError::ModelLoad(e.to_string())
    }
}
