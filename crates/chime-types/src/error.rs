use thiserror::Error;

/// Errors from persistence gateway operations (used by the trait
/// definitions in chime-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the delivery transport.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid delivery target '{0}'")]
    InvalidTarget(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Errors raised at mutation boundaries before data reaches storage.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("engagement factor must be between 0 and 1, got {0}")]
    EngagementFactorOutOfRange(f64),
}
