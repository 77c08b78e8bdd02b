use thiserror::Error;

/// Errors raised while loading or validating a model file.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Shape error in layer '{layer}': {reason}")]
    Shape { layer: String, reason: String },
}

/// Errors raised by the artifact store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact identifier: {0}")]
    InvalidId(String),
}

/// Request-level error taxonomy for the explanation pipeline.
///
/// Missing gradients and all-zero heatmaps are not represented here: both
/// have defined pass-through behaviour and never fail a request.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Malformed or missing image, wrong channel count, bad batch shape,
    /// out-of-range target class.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The loaded model cannot be explained (e.g. no convolutional layer,
    /// unknown layer name, label/score mismatch).
    #[error("Model configuration error: {0}")]
    Configuration(String),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl ExplainError {
    /// True when the caller sent a bad request; false for deployment or
    /// persistence problems.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExplainError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, ExplainError>;
