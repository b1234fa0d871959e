use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// A required raw field is absent after column renaming
    #[error("Schema error: required field '{field}' is missing")]
    Schema { field: String },

    /// Malformed or out-of-range input at inference time
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Training batch too small or a class under-represented
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Model blob or schema manifest absent, unreadable or mismatched
    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    /// No model could be loaded or trained
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Classifier fitting failed
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a schema error for a missing field
    pub fn schema(field: impl Into<String>) -> Self {
        AppError::Schema {
            field: field.into(),
        }
    }

    /// Build a validation error naming the offending field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Schema { .. } => "SCHEMA_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InsufficientData(_) => "INSUFFICIENT_DATA",
            AppError::ArtifactMissing(_) => "ARTIFACT_MISSING",
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure)
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Schema { .. } | AppError::Validation { .. })
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "record".to_string());
        AppError::Validation {
            field,
            message: err.to_string(),
        }
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
