//! Hot-swappable database connection.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::DatabaseConfig;
use crate::credentials::Credentials;
use crate::error::{GatewayError, Result};

/// Pause between pings while a new connection is being verified.
pub const PING_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Target-independent connection parameters. Fixed for the handle's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub timeout: Duration,
}

impl From<&DatabaseConfig> for ConnectionParams {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.name.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Everything needed to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub params: ConnectionParams,
    pub credentials: Credentials,
}

/// Opens, verifies and closes connections of one kind.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// A cheap, shareable handle (for example a pool) to one connection.
    type Connection: Clone + Send + Sync + 'static;

    /// Create the connection. May be lazy; [`Connector::ping`] verifies it.
    async fn open(&self, target: &ConnectionTarget) -> Result<Self::Connection>;

    async fn ping(&self, connection: &Self::Connection) -> Result<()>;

    async fn close(&self, connection: Self::Connection) -> Result<()>;
}

/// Shared reference to a handle, used as dispatcher context.
pub type SharedHandle<K> = Arc<ResourceHandle<K>>;

/// Holds the current database connection and swaps it on reconnect.
///
/// Readers take a clone of the connection under the lock and use it without
/// holding the lock. A reconnect installs the new connection only after it
/// answered a ping, so a failed rotation keeps the old one in service.
pub struct ResourceHandle<K: Connector> {
    connector: K,
    params: ConnectionParams,
    current: Mutex<Option<K::Connection>>,
}

impl<K: Connector> ResourceHandle<K> {
    pub fn new(connector: K, params: ConnectionParams) -> Self {
        Self {
            connector,
            params,
            current: Mutex::new(None),
        }
    }

    pub fn shared(connector: K, params: ConnectionParams) -> SharedHandle<K> {
        Arc::new(Self::new(connector, params))
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn timeout(&self) -> Duration {
        self.params.timeout
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Open a connection with `credentials` and make it current.
    ///
    /// The ping is retried every [`PING_RETRY_INTERVAL`] until the configured
    /// timeout elapses. On timeout the unverified connection is closed and
    /// the current one is left untouched.
    pub async fn reconnect(&self, credentials: Credentials) -> Result<()> {
        let timeout = self.params.timeout;
        info!(
            host = %self.params.host,
            port = self.params.port,
            database = %self.params.database,
            user = %credentials.username,
            timeout_secs = timeout.as_secs(),
            "Connecting to database"
        );

        let deadline = Instant::now() + timeout;
        let target = ConnectionTarget {
            params: self.params.clone(),
            credentials,
        };

        let connection = match tokio::time::timeout_at(deadline, self.connector.open(&target)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(self.deadline_error()),
        };

        if let Err(e) = self.verify(&connection, deadline).await {
            if let Err(close_err) = self.connector.close(connection).await {
                debug!("Failed to close unverified connection: {}", close_err);
            }
            return Err(e);
        }

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            if let Err(e) = self.connector.close(previous).await {
                warn!("Failed to close the previous database connection: {}", e);
            }
        }
        *current = Some(connection);
        drop(current);

        info!(
            "Connected to database {} at {}:{}",
            self.params.database, self.params.host, self.params.port
        );
        Ok(())
    }

    async fn verify(&self, connection: &K::Connection, deadline: Instant) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.deadline_error());
            }
            attempt += 1;

            match tokio::time::timeout_at(deadline, self.connector.ping(connection)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => debug!("Ping attempt {} failed: {}", attempt, e),
                Err(_) => return Err(self.deadline_error()),
            }

            let wake = (Instant::now() + PING_RETRY_INTERVAL).min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }

    fn deadline_error(&self) -> GatewayError {
        GatewayError::Timeout(format!(
            "database {}:{} did not answer within {}s",
            self.params.host,
            self.params.port,
            self.params.timeout.as_secs()
        ))
    }

    /// Clone of the current connection.
    pub async fn connection(&self) -> Result<K::Connection> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or(GatewayError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Close the current connection, if any.
    pub async fn close(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(connection) => {
                info!("Closing database connection");
                self.connector.close(connection).await
            }
            None => Ok(()),
        }
    }
}
