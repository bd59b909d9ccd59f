//! Error types for the store.

use thiserror::Error;

/// Failures surfaced by every public store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No usable `[db]` configuration was supplied
    #[error("database configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The configured driver is unknown, or known but not implemented
    #[error("unsupported database backend '{driver}': {reason}")]
    UnsupportedBackend { driver: String, reason: String },

    /// Opening the database handle failed
    #[error("failed to connect to database: {0}")]
    Connect(String),

    /// Textual input (schema or record JSON) could not be parsed
    #[error("failed to parse input: {0}")]
    Parse(String),

    /// Input parsed, but is not acceptable
    #[error("validation failed: {0}")]
    Validation(String),

    /// A table or column name failed the identifier allow-list
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// The engine rejected a statement
    #[error("statement execution failed: {0}")]
    Execution(String),

    /// The table named by an operation does not exist
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// A statement reported success but its effect is not observable
    #[error("post-condition failed: {0}")]
    PostCondition(String),

    /// A fetched value has a type that cannot be coerced as requested
    #[error("unsupported value type '{0}'")]
    UnsupportedValueType(String),

    /// Another caller panicked while holding the connection
    #[error("connection mutex poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Execution(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}
