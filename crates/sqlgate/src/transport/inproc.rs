//! In-process endpoint registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::{Incoming, SocketKind};
use crate::error::TransportError;

struct Registration {
    kind: SocketKind,
    queue: mpsc::Sender<Incoming>,
}

/// Registry of `inproc://` endpoints.
///
/// Sockets only see each other when created from clones of the same context.
/// A name is released when the socket bound to it is dropped.
#[derive(Clone, Default)]
pub struct Context {
    endpoints: Arc<Mutex<HashMap<String, Registration>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub(crate) fn register(
        &self,
        name: &str,
        kind: SocketKind,
        queue: mpsc::Sender<Incoming>,
    ) -> Result<(), TransportError> {
        let mut endpoints = self.lock();
        if endpoints.contains_key(name) {
            return Err(TransportError::AddressInUse(format!("inproc://{}", name)));
        }
        endpoints.insert(name.to_string(), Registration { kind, queue });
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) {
        self.lock().remove(name);
    }

    pub(crate) fn lookup(
        &self,
        name: &str,
        requested: SocketKind,
    ) -> Result<mpsc::Sender<Incoming>, TransportError> {
        let endpoints = self.lock();
        let registration = endpoints
            .get(name)
            .ok_or_else(|| TransportError::ConnectionRefused(format!("inproc://{}", name)))?;
        if registration.kind != requested {
            return Err(TransportError::KindMismatch {
                endpoint: format!("inproc://{}", name),
                bound: registration.kind.peer_name(),
                requested: requested.peer_name(),
            });
        }
        Ok(registration.queue.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.endpoints.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("Context").field("endpoints", &names).finish()
    }
}
