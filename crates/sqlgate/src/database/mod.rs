//! Database access.
//!
//! - [`ResourceHandle`]: the current connection, replaced on credential rotation
//! - [`Connector`] / [`MySqlConnector`]: how connections are opened
//! - [`QueryExecutor`]: how a connection runs SQL
//! - [`register_database_commands`]: the public query commands

mod handle;
mod handlers;
mod mysql;
mod value;

pub use handle::{
    ConnectionParams, ConnectionTarget, Connector, ResourceHandle, SharedHandle,
    PING_RETRY_INTERVAL,
};
pub use handlers::{
    register_database_commands, QueryHandler, QueryKind, NOTHING_DELETED, NOTHING_WRITTEN,
    NOT_FOUND,
};
pub use mysql::MySqlConnector;
pub use value::{from_mysql, to_mysql, ColumnInfo};

use async_trait::async_trait;
use sqlgate_protocol::{Argument, Parameters};

use crate::error::Result;

/// Runs SQL with positional arguments.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query and return its rows as column name to value maps.
    async fn fetch(&self, sql: &str, arguments: Vec<Argument>) -> Result<Vec<Parameters>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, arguments: Vec<Argument>) -> Result<u64>;
}
