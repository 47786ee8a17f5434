//! sqlgate - database gateway with live credential rotation
//!
//! This library provides the pieces of a database service that:
//! - Serves JSON commands over request/reply sockets ([`dispatcher`], [`transport`])
//! - Runs queries against a connection that can be replaced while serving ([`database`])
//! - Receives new credentials on an in-process control channel ([`control`])
//! - Renews secret-store leases and rotates credentials before they expire ([`secrets`])

#[macro_use]
mod logging;

pub mod client;
pub mod config;
pub mod control;
pub mod credentials;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod secrets;
pub mod service;
pub mod transport;

pub use client::ServiceClient;
pub use config::Config;
pub use credentials::Credentials;
pub use database::{Connector, MySqlConnector, QueryExecutor, ResourceHandle, SharedHandle};
pub use dispatcher::{Channel, CommandHandler, Dispatcher};
pub use error::{GatewayError, LeaseError, Result, TransportError};
pub use secrets::{LeaseRenewer, SecretProvider, VaultProvider};
pub use transport::{Context, Endpoint};

pub use sqlgate_protocol as protocol;
