//! Error types for sqlgate-protocol

use thiserror::Error;

/// Errors raised while parsing, encoding or validating envelopes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The raw bytes are not a valid envelope
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The request names no command
    #[error("request command is empty")]
    EmptyCommand,

    /// The parameters could not be decoded into the expected shape
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A value could not be turned into envelope parameters
    #[error("encoding failed: {0}")]
    Encode(String),

    /// A query request is missing something the SQL builder needs
    #[error("{0}")]
    InvalidQuery(String),
}

/// Result type alias for ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
