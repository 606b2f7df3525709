use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    #[error("Partition {0} has failed and no longer processes commands")]
    PartitionFailed(u32),

    #[error("Unknown partition {0}")]
    UnknownPartition(u32),

    #[error("Log error: {0}")]
    LogError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Scheduling error: {0}")]
    SchedulingError(String),

    #[error("Background task error: {0}")]
    BackgroundError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for EngineError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::ProcessingError(format!("password hashing failed: {}", err))
    }
}
