use thiserror::Error;

/// Main error type for the prediction service and model tooling
#[derive(Error, Debug)]
pub enum AgriError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    // Model runtime errors (load, shaping, inference)
    #[error("Model error: {0}")]
    Model(String),

    // Failures raised by the inference runtime, with their cause chain
    #[error("Model error: {0:#}")]
    Runtime(#[from] anyhow::Error),

    // Structural validation of a model graph
    #[error("Invalid model: {}", .0.join("; "))]
    InvalidModel(Vec<String>),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for AgriError
pub type Result<T> = std::result::Result<T, AgriError>;

/// Errors raised while rewriting a model graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepairError {
    #[error("Initializer '{name}' stores its data externally and cannot be converted")]
    ExternalData { name: String },

    #[error("Initializer '{name}' has a raw payload of {len} bytes, not a multiple of 8")]
    MisalignedPayload { name: String, len: usize },

    #[error("Refusing to overwrite the input model at {path}")]
    OverwriteInput { path: String },
}

impl From<RepairError> for AgriError {
    fn from(err: RepairError) -> Self {
        AgriError::Validation(err.to_string())
    }
}
