use thiserror::Error;

/// Typed error hierarchy for hearsay.
///
/// Use at module boundaries (registration, conversation storage, driver
/// delivery). Internal/leaf functions can continue using `anyhow::Result` —
/// the `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum HearsayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Conversation cache error: {0}")]
    Cache(String),

    #[error("Driver error: {driver}: {message}")]
    Driver { driver: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using HearsayError.
pub type HearsayResult<T> = std::result::Result<T, HearsayError>;
