//! Error types for Lattice
//!
//! One error enum serves the whole workspace. The store client reports
//! failures through [`Error::Store`]; the engine never retries a failed
//! store call, it propagates the error to the caller unchanged.

use thiserror::Error;

/// Result type alias for Lattice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Lattice engine
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying store call failed or timed out.
    ///
    /// Propagated unchanged; no retry happens inside the engine. After a
    /// failed index-maintenance batch the record's indexes may be stale
    /// relative to its primary write.
    #[error("store error: {0}")]
    Store(String),

    /// A key holds a different structure than the operation expects
    /// (e.g. a sorted-set read against a plain set)
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType {
        /// Key the operation was issued against
        key: String,
        /// Structure kind the operation expected
        expected: &'static str,
    },

    /// The query cannot be answered from the available index structures
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A collaborator invoked the engine without the required wiring
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Serialization or deserialization failed
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Operation is not available for the entity's storage encoding
    #[error("operation '{operation}' is not supported for {encoding}-encoded entity '{entity}'")]
    UnsupportedEncoding {
        /// Entity type name
        entity: String,
        /// Encoding the entity is declared with
        encoding: &'static str,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Entity type has not been registered
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}
