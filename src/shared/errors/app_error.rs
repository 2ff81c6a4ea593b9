use serde::Serialize;
use thiserror::Error;

/// Longest validation message carried into a stored `error_message`
const MAX_PUBLIC_MESSAGE_LEN: usize = 200;

#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl AppError {
    /// Whether a job that failed with this error should be attempted again.
    ///
    /// Transient conditions (missing paths, unreachable services, database
    /// hiccups) are retried. Anything that will fail identically on the next
    /// attempt (bad payloads, programming errors) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DatabaseError(_)
            | AppError::NotFound(_)
            | AppError::ExternalServiceError(_)
            | AppError::RateLimitError(_)
            | AppError::ServiceUnavailable(_)
            | AppError::Io(_) => true,

            AppError::InvalidInput(_)
            | AppError::ValidationError(_)
            | AppError::SerializationError(_)
            | AppError::ConfigurationError(_)
            | AppError::InternalError(_) => false,
        }
    }

    /// Client-safe summary of the error.
    ///
    /// Only validation messages are passed through (first line, truncated);
    /// every other variant collapses to a fixed description so paths,
    /// connection strings and backtraces never reach API consumers.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg) | AppError::InvalidInput(msg) => {
                let first_line = msg.lines().next().unwrap_or_default().trim();
                let truncated: String = first_line.chars().take(MAX_PUBLIC_MESSAGE_LEN).collect();
                format!("Invalid job payload: {}", truncated)
            }
            AppError::SerializationError(_) => "Invalid job payload".to_string(),
            AppError::NotFound(_) => "Requested resource was not found".to_string(),
            AppError::ExternalServiceError(_) => "External service unavailable".to_string(),
            AppError::RateLimitError(_) => "Rate limited by external service".to_string(),
            AppError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            AppError::DatabaseError(_) => "Database error".to_string(),
            AppError::Io(_) => "File system error".to_string(),
            AppError::ConfigurationError(_) | AppError::InternalError(_) => {
                "Internal error".to_string()
            }
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                AppError::NotFound("Record not found in database".to_string())
            }
            _ => AppError::DatabaseError(err.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        AppError::DatabaseError(format!("Database pool error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            _ => AppError::Io(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Background task failed: {}", err))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
