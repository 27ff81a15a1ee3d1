use thiserror::Error;

/// Core error types for Chrysalis
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Version allocation or record persistence failed in the registry
    #[error("registry error: {0}")]
    Registry(String),

    /// Queue transport failure
    #[error("queue error: {0}")]
    Queue(String),

    /// Durable store failure
    #[error("store error: {0}")]
    Store(String),

    /// A registry record lookup missed
    #[error("schema version {0} not found")]
    SchemaNotFound(i64),

    /// The promotion token did not match
    #[error("invalid promotion token")]
    Unauthorized,
}

/// Result type alias using Chrysalis' Error type
pub type Result<T> = std::result::Result<T, Error>;
