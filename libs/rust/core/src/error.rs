use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Library-wide error type. Binaries wrap these with `anyhow` context.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("model is not fitted")]
    NotFitted,

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("artifact digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("registry call failed ({code}): {message}")]
    RegistryApi { code: String, message: String },

    #[error("no model version found for {name} ({selector})")]
    VersionNotFound { name: String, selector: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    ConfigBuild(#[from] config::ConfigError),
}
