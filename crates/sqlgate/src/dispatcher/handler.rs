//! Command handler trait and table.

use async_trait::async_trait;
use sqlgate_protocol::{Reply, Request};
use std::collections::HashMap;
use std::sync::Arc;

/// Handles one command.
///
/// `C` is the context shared by every handler of a dispatcher. Failures are
/// reported as FAIL replies, so a handler cannot stop the dispatcher.
#[async_trait]
pub trait CommandHandler<C>: Send + Sync {
    async fn handle(&self, request: &Request, context: &C) -> Reply;
}

/// Command name to handler. Filled before serving and read-only afterwards.
pub struct HandlerTable<C> {
    handlers: HashMap<String, Arc<dyn CommandHandler<C>>>,
}

impl<C> HandlerTable<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add a handler, replacing any previous handler for `name`.
    ///
    /// Returns true when a handler was replaced.
    pub fn insert(&mut self, name: String, handler: Arc<dyn CommandHandler<C>>) -> bool {
        self.handlers.insert(name, handler).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler<C>>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
