//! Error types for sqlgate

use sqlgate_protocol::ProtocolError;
use thiserror::Error;

/// Message returned when a query arrives before any credentials were applied.
pub const NOT_CONNECTED: &str = "Connection is nil, please open the connection first";

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// I/O error (network, file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Envelope parsing or encoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The resource handle holds no connection
    #[error("{}", NOT_CONNECTED)]
    NotConnected,

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Query execution failure
    #[error("Query error: {0}")]
    Query(String),

    /// Lease renewal or secret retrieval failure
    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    /// A service task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

/// Result type alias for GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        GatewayError::Config(err.to_string())
    }
}

impl From<mysql_async::Error> for GatewayError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) => GatewayError::Query(e.message),
            other => GatewayError::Connection(other.to_string()),
        }
    }
}

/// Errors raised by sockets and endpoints
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("address already in use: {0}")]
    AddressInUse(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("endpoint {endpoint} accepts {bound} sockets, not {requested}")]
    KindMismatch {
        endpoint: String,
        bound: &'static str,
        requested: &'static str,
    },

    #[error("no pending request to reply to")]
    NoPendingRequest,

    #[error("socket closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the lease renewal loop and secret providers
#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("login failed: {0}")]
    Login(String),

    #[error("failed to fetch credentials: {0}")]
    Fetch(String),

    #[error("failed to renew lease: {0}")]
    Renew(String),

    #[error("failed to deliver credentials: {0}")]
    Delivery(String),
}
