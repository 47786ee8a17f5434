//! Secret provider seam and lease watchers.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Lease;
use crate::credentials::Credentials;
use crate::error::LeaseError;

/// Events emitted while a lease is watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The lease was extended
    Renewed { remaining: Duration },
    /// The lease can no longer be extended. Always the last event.
    Done { reason: Option<String> },
}

/// Receiving end of a lease watcher.
///
/// The watcher task stops when [`LeaseWatcher::stop`] is called or this value
/// is dropped.
pub struct LeaseWatcher {
    events: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
}

/// Task side of a [`LeaseWatcher`].
pub struct WatcherHandle {
    events: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
}

impl LeaseWatcher {
    pub fn channel() -> (LeaseWatcher, WatcherHandle) {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        (
            LeaseWatcher {
                events: rx,
                cancel: cancel.clone(),
            },
            WatcherHandle { events: tx, cancel },
        )
    }

    /// Next event. A watcher whose task ended silently reports `Done`.
    pub async fn next(&mut self) -> WatchEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => WatchEvent::Done {
                reason: Some("lease watcher ended".to_string()),
            },
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LeaseWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl WatcherHandle {
    /// Send an event. Returns false once the watcher is gone.
    pub async fn emit(&self, event: WatchEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.events.send(event).await.is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the watcher is stopped or dropped.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

/// Source of login tokens and database credentials.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Authenticate and return the auth lease.
    async fn login(&self) -> Result<Lease, LeaseError>;

    /// Fetch fresh database credentials and their lease.
    async fn resource_credentials(&self) -> Result<(Credentials, Lease), LeaseError>;

    /// Start renewing `lease` in the background.
    fn watch(&self, lease: &Lease) -> LeaseWatcher;
}

/// Where fetched credentials are sent.
#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn deliver(&self, credentials: &Credentials) -> Result<(), LeaseError>;
}
