//! Shared fixtures for sqlgate integration tests.
//!
//! - [`MemoryConnector`]: connections backed by scripted rows
//! - [`ScriptedProvider`]: a secret provider whose watchers are driven by the test
//! - [`RecordingSink`]: remembers every delivered credential

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use sqlgate::database::{ConnectionParams, ConnectionTarget, Connector, QueryExecutor};
use sqlgate::error::{GatewayError, LeaseError, Result};
use sqlgate::protocol::{Argument, Parameters};
use sqlgate::secrets::{
    CredentialSink, Lease, LeaseKind, LeaseWatcher, SecretProvider, WatchEvent, WatcherHandle,
};
use sqlgate::Credentials;

pub fn params(timeout: Duration) -> ConnectionParams {
    ConnectionParams {
        host: "127.0.0.1".to_string(),
        port: 3306,
        database: "seascape_sds".to_string(),
        timeout,
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// State shared by a [`MemoryConnector`] and every connection it opened.
#[derive(Default)]
pub struct MemoryDatabase {
    pub rows: Mutex<Vec<Parameters>>,
    pub affected: Mutex<u64>,
    pub statements: Mutex<Vec<(String, Vec<Argument>)>>,
    pub opened: Mutex<Vec<(usize, String)>>,
    pub closed: Mutex<Vec<usize>>,
    /// Users whose connections never answer a ping.
    pub unreachable_users: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct MemoryConnection {
    pub id: usize,
    pub username: String,
    database: Arc<MemoryDatabase>,
}

#[async_trait]
impl QueryExecutor for MemoryConnection {
    async fn fetch(&self, sql: &str, arguments: Vec<Argument>) -> Result<Vec<Parameters>> {
        self.database
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), arguments));
        Ok(self.database.rows.lock().unwrap().clone())
    }

    async fn execute(&self, sql: &str, arguments: Vec<Argument>) -> Result<u64> {
        self.database
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), arguments));
        Ok(*self.database.affected.lock().unwrap())
    }
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub database: Arc<MemoryDatabase>,
    next_id: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, rows: Vec<Parameters>) {
        *self.database.rows.lock().unwrap() = rows;
    }

    pub fn set_affected(&self, affected: u64) {
        *self.database.affected.lock().unwrap() = affected;
    }

    pub fn make_unreachable(&self, username: &str) {
        self.database
            .unreachable_users
            .lock()
            .unwrap()
            .push(username.to_string());
    }

    pub fn opened(&self) -> Vec<(usize, String)> {
        self.database.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<usize> {
        self.database.closed.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<(String, Vec<Argument>)> {
        self.database.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn open(&self, target: &ConnectionTarget) -> Result<MemoryConnection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let username = target.credentials.username.clone();
        self.database
            .opened
            .lock()
            .unwrap()
            .push((id, username.clone()));
        Ok(MemoryConnection {
            id,
            username,
            database: Arc::clone(&self.database),
        })
    }

    async fn ping(&self, connection: &MemoryConnection) -> Result<()> {
        let unreachable = self
            .database
            .unreachable_users
            .lock()
            .unwrap()
            .contains(&connection.username);
        if unreachable {
            Err(GatewayError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn close(&self, connection: MemoryConnection) -> Result<()> {
        self.database.closed.lock().unwrap().push(connection.id);
        Ok(())
    }
}

/// Something the scripted provider was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Login,
    Fetch,
    Watch(LeaseKind),
}

/// A secret provider answering from queues.
///
/// Every `watch` call hands its [`WatcherHandle`] to the receiver returned by
/// [`ScriptedProvider::new`], so the test decides when leases renew or end.
#[derive(Clone)]
pub struct ScriptedProvider {
    pub calls: Arc<Mutex<Vec<ProviderCall>>>,
    /// Kind and remaining lifetime of every lease handed to `watch`.
    pub watched: Arc<Mutex<Vec<(LeaseKind, Duration)>>>,
    logins: Arc<Mutex<VecDeque<std::result::Result<Lease, LeaseError>>>>,
    fetches: Arc<Mutex<VecDeque<std::result::Result<(Credentials, Lease), LeaseError>>>>,
    handles: mpsc::UnboundedSender<(LeaseKind, WatcherHandle)>,
}

impl ScriptedProvider {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(LeaseKind, WatcherHandle)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = Self {
            calls: Arc::default(),
            watched: Arc::default(),
            logins: Arc::default(),
            fetches: Arc::default(),
            handles: tx,
        };
        (provider, rx)
    }

    pub fn push_login(&self, lease: std::result::Result<Lease, LeaseError>) -> &Self {
        self.logins.lock().unwrap().push_back(lease);
        self
    }

    pub fn push_fetch(
        &self,
        result: std::result::Result<(Credentials, Lease), LeaseError>,
    ) -> &Self {
        self.fetches.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn watched(&self) -> Vec<(LeaseKind, Duration)> {
        self.watched.lock().unwrap().clone()
    }
}

pub fn auth_lease(id: &str) -> Lease {
    Lease::new(
        LeaseKind::Auth,
        id,
        "s.token",
        true,
        Duration::from_secs(3600),
    )
}

pub fn resource_lease(id: &str) -> Lease {
    Lease::new(
        LeaseKind::Resource,
        format!("database/creds/sds/{}", id),
        format!("database/creds/sds/{}", id),
        true,
        Duration::from_secs(3600),
    )
}

pub fn issued(username: &str) -> std::result::Result<(Credentials, Lease), LeaseError> {
    Ok((Credentials::new(username, "pw"), resource_lease(username)))
}

#[async_trait]
impl SecretProvider for ScriptedProvider {
    async fn login(&self) -> std::result::Result<Lease, LeaseError> {
        self.calls.lock().unwrap().push(ProviderCall::Login);
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LeaseError::Login("no scripted login".to_string())))
    }

    async fn resource_credentials(&self) -> std::result::Result<(Credentials, Lease), LeaseError> {
        self.calls.lock().unwrap().push(ProviderCall::Fetch);
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LeaseError::Fetch("no scripted credentials".to_string())))
    }

    fn watch(&self, lease: &Lease) -> LeaseWatcher {
        self.calls
            .lock()
            .unwrap()
            .push(ProviderCall::Watch(lease.kind()));
        self.watched
            .lock()
            .unwrap()
            .push((lease.kind(), lease.remaining()));
        let (watcher, handle) = LeaseWatcher::channel();
        let _ = self.handles.send((lease.kind(), handle));
        watcher
    }
}

/// Watcher handles of one watch cycle, in the order the renewer creates them.
pub struct Cycle {
    pub auth: Option<WatcherHandle>,
    pub resource: WatcherHandle,
}

/// Wait for the watchers of the next cycle.
///
/// Handles must be kept alive: a dropped handle ends its watcher.
pub async fn next_cycle(
    handles: &mut mpsc::UnboundedReceiver<(LeaseKind, WatcherHandle)>,
    watch_auth_lease: bool,
) -> Cycle {
    let auth = if watch_auth_lease {
        let (kind, handle) = handles.recv().await.expect("provider dropped");
        assert_eq!(kind, LeaseKind::Auth);
        Some(handle)
    } else {
        None
    };
    let (kind, resource) = handles.recv().await.expect("provider dropped");
    assert_eq!(kind, LeaseKind::Resource);
    Cycle { auth, resource }
}

pub fn done() -> WatchEvent {
    WatchEvent::Done { reason: None }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub delivered: Arc<Mutex<Vec<String>>>,
    notify: Arc<tokio::sync::Notify>,
}

impl RecordingSink {
    pub fn usernames(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    /// Wait until at least `count` deliveries were recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.delivered.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl CredentialSink for RecordingSink {
    async fn deliver(&self, credentials: &Credentials) -> std::result::Result<(), LeaseError> {
        self.delivered
            .lock()
            .unwrap()
            .push(credentials.username.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
