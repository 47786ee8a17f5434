//! Lease renewal loop.
//!
//! The loop watches the auth lease (optional) and the resource lease. While
//! both renew it only logs. When one of them can no longer be renewed it
//! recovers in a fixed order:
//!
//! 1. log in again when the auth lease expires
//! 2. fetch new database credentials and deliver them
//!
//! An expiring auth lease also revokes the credentials issued under it, so
//! it triggers both steps. Any recovery failure ends the loop with an error.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::provider::{CredentialSink, LeaseWatcher, SecretProvider, WatchEvent};
use super::{Lease, LeaseKind};
use crate::error::LeaseError;

/// Why a watch cycle ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalOutcome {
    pub exit_requested: bool,
    pub expiring_auth_lease: bool,
    pub expiring_resource_lease: bool,
}

impl RenewalOutcome {
    pub fn exit() -> Self {
        Self {
            exit_requested: true,
            ..Default::default()
        }
    }

    pub fn auth_expiring() -> Self {
        Self {
            expiring_auth_lease: true,
            expiring_resource_lease: true,
            ..Default::default()
        }
    }

    pub fn resource_expiring() -> Self {
        Self {
            expiring_resource_lease: true,
            ..Default::default()
        }
    }

    /// Checked before the other predicates.
    pub fn should_exit(&self) -> bool {
        self.exit_requested
    }

    pub fn needs_login(&self) -> bool {
        !self.exit_requested && self.expiring_auth_lease
    }

    pub fn needs_credentials(&self) -> bool {
        !self.exit_requested && self.expiring_resource_lease
    }
}

/// Where the renewal loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    Watching,
    Renewed,
    Reauthenticating,
    RefetchingCredentials,
    Stopped,
}

/// Keeps the auth and resource leases alive and rotates credentials.
pub struct LeaseRenewer<P, S> {
    provider: P,
    sink: S,
    watch_auth_lease: bool,
    auth_lease: Lease,
    resource_lease: Lease,
    state: RenewalState,
}

impl<P, S> LeaseRenewer<P, S>
where
    P: SecretProvider,
    S: CredentialSink,
{
    /// Log in, fetch the first credentials and deliver them.
    pub async fn start(
        provider: P,
        sink: S,
        watch_auth_lease: bool,
    ) -> Result<Self, LeaseError> {
        let auth_lease = provider.login().await?;
        info!("Logged in to the secret store, auth lease {}", auth_lease.id());

        let (credentials, resource_lease) = provider.resource_credentials().await?;
        info!(
            "Fetched database credentials for {}, lease {}",
            credentials.username,
            resource_lease.id()
        );
        sink.deliver(&credentials).await?;

        Ok(Self {
            provider,
            sink,
            watch_auth_lease,
            auth_lease,
            resource_lease,
            state: RenewalState::Watching,
        })
    }

    pub fn state(&self) -> RenewalState {
        self.state
    }

    pub fn auth_lease(&self) -> &Lease {
        &self.auth_lease
    }

    pub fn resource_lease(&self) -> &Lease {
        &self.resource_lease
    }

    /// Run until `cancel` fires or recovery fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LeaseError> {
        info!("Lease renewal loop started");
        let result = self.run_cycles(&cancel).await;
        self.transition(RenewalState::Stopped);
        match &result {
            Ok(()) => info!("Lease renewal loop stopped"),
            Err(e) => error!("Lease renewal loop failed: {}", e),
        }
        result
    }

    async fn run_cycles(&mut self, cancel: &CancellationToken) -> Result<(), LeaseError> {
        loop {
            let outcome = self.watch_cycle(cancel).await;
            if outcome.should_exit() {
                return Ok(());
            }

            if outcome.needs_login() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.transition(RenewalState::Reauthenticating);
                warn!("Auth lease can no longer be renewed, logging in again");
                self.auth_lease = self.provider.login().await?;
            }

            if outcome.needs_credentials() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.transition(RenewalState::RefetchingCredentials);
                warn!("Database lease can no longer be renewed, fetching new credentials");
                let (credentials, lease) = self.provider.resource_credentials().await?;
                self.sink.deliver(&credentials).await?;
                info!("Delivered new credentials, lease {}", lease.id());
                self.resource_lease = lease;
            }

            self.transition(RenewalState::Watching);
        }
    }

    /// Watch both leases until one expires or `cancel` fires.
    ///
    /// Watchers are created per cycle and stop when this returns.
    async fn watch_cycle(&mut self, cancel: &CancellationToken) -> RenewalOutcome {
        let mut auth_watcher = if self.watch_auth_lease {
            Some(self.provider.watch(&self.auth_lease))
        } else {
            None
        };
        let mut resource_watcher = self.provider.watch(&self.resource_lease);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return RenewalOutcome::exit(),

                event = next_event(auth_watcher.as_mut()) => match event {
                    WatchEvent::Done { reason } => {
                        log_done("auth", reason);
                        return RenewalOutcome::auth_expiring();
                    }
                    WatchEvent::Renewed { remaining } => {
                        self.renewed(LeaseKind::Auth, remaining)
                    }
                },

                event = resource_watcher.next() => match event {
                    WatchEvent::Done { reason } => {
                        log_done("database", reason);
                        return RenewalOutcome::resource_expiring();
                    }
                    WatchEvent::Renewed { remaining } => {
                        self.renewed(LeaseKind::Resource, remaining)
                    }
                },
            }
        }
    }

    /// The next cycle watches the renewed lease, not the one first issued.
    fn renewed(&mut self, kind: LeaseKind, remaining: Duration) {
        self.transition(RenewalState::Renewed);
        let (which, lease) = match kind {
            LeaseKind::Auth => ("auth", &mut self.auth_lease),
            LeaseKind::Resource => ("database", &mut self.resource_lease),
        };
        lease.renewed(remaining);
        info!(
            "Renewed {} lease, {}s remaining",
            which,
            remaining.as_secs()
        );
        self.transition(RenewalState::Watching);
    }

    fn transition(&mut self, next: RenewalState) {
        if self.state != next {
            trace!("Renewal state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

async fn next_event(watcher: Option<&mut LeaseWatcher>) -> WatchEvent {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

fn log_done(which: &str, reason: Option<String>) {
    match reason {
        Some(reason) => warn!("{} lease watcher done: {}", which, reason),
        None => info!("{} lease reached its maximum lifetime", which),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        let exit = RenewalOutcome {
            exit_requested: true,
            expiring_auth_lease: true,
            expiring_resource_lease: true,
        };
        assert!(exit.should_exit());
        assert!(!exit.needs_login());
        assert!(!exit.needs_credentials());

        let auth = RenewalOutcome::auth_expiring();
        assert!(auth.needs_login());
        assert!(auth.needs_credentials());

        let resource = RenewalOutcome::resource_expiring();
        assert!(!resource.needs_login());
        assert!(resource.needs_credentials());

        assert_eq!(
            RenewalOutcome::default(),
            RenewalOutcome {
                exit_requested: false,
                expiring_auth_lease: false,
                expiring_resource_lease: false,
            }
        );
    }
}
