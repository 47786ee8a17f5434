//! Expiring secrets and credential rotation.
//!
//! A [`SecretProvider`] issues an auth lease (the login) and resource leases
//! (database credentials). The [`LeaseRenewer`] keeps both alive and pushes
//! new credentials to a [`CredentialSink`] whenever the old ones expire.

mod lease;
mod provider;
mod renewal;
mod vault;

pub use lease::{Lease, LeaseKind};
pub use provider::{CredentialSink, LeaseWatcher, SecretProvider, WatchEvent, WatcherHandle};
pub use renewal::{LeaseRenewer, RenewalOutcome, RenewalState};
pub use vault::VaultProvider;
