//! HashiCorp Vault secret provider.
//!
//! Uses the HTTP API directly:
//!
//! - `POST /v1/auth/approle/login` or `GET /v1/auth/token/lookup-self` to log in
//! - `GET /v1/<database_path>` for dynamic database credentials
//! - `POST /v1/auth/token/renew-self` and `PUT /v1/sys/leases/renew` to renew

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use zeroize::Zeroizing;

use super::provider::{LeaseWatcher, SecretProvider, WatchEvent, WatcherHandle};
use super::{Lease, LeaseKind};
use crate::config::VaultConfig;
use crate::credentials::Credentials;
use crate::error::{GatewayError, LeaseError};

/// HTTP timeout of a single Vault call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Deserialize)]
struct AuthResponse {
    auth: AuthInfo,
}

#[derive(Deserialize)]
struct AuthInfo {
    client_token: String,
    #[serde(default)]
    accessor: String,
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Deserialize)]
struct LookupResponse {
    data: LookupData,
}

#[derive(Deserialize)]
struct LookupData {
    #[serde(default)]
    accessor: String,
    ttl: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Deserialize)]
struct SecretResponse {
    lease_id: String,
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
    data: Credentials,
}

#[derive(Deserialize)]
struct LeaseRenewResponse {
    lease_duration: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

enum VaultAuth {
    Token(Zeroizing<String>),
    AppRole {
        role_id: String,
        secret_id: Zeroizing<String>,
    },
}

/// HTTP access shared by the provider and its watcher tasks.
#[derive(Clone)]
struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: watch::Receiver<Zeroizing<String>>,
}

impl VaultClient {
    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn current_token(&self) -> Zeroizing<String> {
        self.token.borrow().clone()
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, String> {
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let errors = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.errors.join("; "))
                .unwrap_or_default();
            return Err(format!("vault returned {}: {}", status, errors));
        }
        response.json::<T>().await.map_err(|e| e.to_string())
    }

    /// Extend `lease` by its original duration. Returns the granted duration.
    async fn renew(&self, lease: &Lease) -> Result<Duration, LeaseError> {
        let increment = lease.duration().as_secs();
        let granted = match lease.kind() {
            LeaseKind::Auth => {
                let request = self
                    .http
                    .post(self.url("auth/token/renew-self"))
                    .header(TOKEN_HEADER, lease.secret())
                    .json(&serde_json::json!({ "increment": increment }));
                self.send::<AuthResponse>(request)
                    .await
                    .map_err(LeaseError::Renew)?
                    .auth
                    .lease_duration
            }
            LeaseKind::Resource => {
                let request = self
                    .http
                    .put(self.url("sys/leases/renew"))
                    .header(TOKEN_HEADER, self.current_token().as_str())
                    .json(&serde_json::json!({
                        "lease_id": lease.secret(),
                        "increment": increment,
                    }));
                self.send::<LeaseRenewResponse>(request)
                    .await
                    .map_err(LeaseError::Renew)?
                    .lease_duration
            }
        };
        Ok(Duration::from_secs(granted))
    }
}

/// [`SecretProvider`] backed by Vault.
pub struct VaultProvider {
    client: VaultClient,
    token: watch::Sender<Zeroizing<String>>,
    auth: VaultAuth,
    database_path: String,
}

impl VaultProvider {
    pub fn new(config: &VaultConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build Vault client: {}", e)))?;

        let auth = match (&config.approle, &config.token) {
            (Some(approle), _) => VaultAuth::AppRole {
                role_id: approle.role_id.clone(),
                secret_id: Zeroizing::new(approle.secret_id.clone()),
            },
            (None, Some(token)) => VaultAuth::Token(Zeroizing::new(token.clone())),
            (None, None) => {
                return Err(GatewayError::Config(
                    "Vault requires either a token or an approle login".to_string(),
                ))
            }
        };

        let (token, token_rx) = watch::channel(Zeroizing::new(String::new()));
        Ok(Self {
            client: VaultClient {
                http,
                address: config.address.clone(),
                token: token_rx,
            },
            token,
            auth,
            database_path: config.database_path.trim_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SecretProvider for VaultProvider {
    async fn login(&self) -> Result<Lease, LeaseError> {
        let lease = match &self.auth {
            VaultAuth::AppRole { role_id, secret_id } => {
                let request = self
                    .client
                    .http
                    .post(self.client.url("auth/approle/login"))
                    .json(&serde_json::json!({
                        "role_id": role_id,
                        "secret_id": secret_id.as_str(),
                    }));
                let auth = self
                    .client
                    .send::<AuthResponse>(request)
                    .await
                    .map_err(LeaseError::Login)?
                    .auth;
                Lease::new(
                    LeaseKind::Auth,
                    auth.accessor,
                    auth.client_token,
                    auth.renewable,
                    Duration::from_secs(auth.lease_duration),
                )
            }
            VaultAuth::Token(token) => {
                let request = self
                    .client
                    .http
                    .get(self.client.url("auth/token/lookup-self"))
                    .header(TOKEN_HEADER, token.as_str());
                let data = self
                    .client
                    .send::<LookupResponse>(request)
                    .await
                    .map_err(LeaseError::Login)?
                    .data;
                Lease::new(
                    LeaseKind::Auth,
                    data.accessor,
                    token.as_str(),
                    data.renewable,
                    Duration::from_secs(data.ttl),
                )
            }
        };

        self.token.send_replace(Zeroizing::new(lease.secret().to_string()));
        Ok(lease)
    }

    async fn resource_credentials(&self) -> Result<(Credentials, Lease), LeaseError> {
        let request = self
            .client
            .http
            .get(self.client.url(&self.database_path))
            .header(TOKEN_HEADER, self.client.current_token().as_str());
        let secret = self
            .client
            .send::<SecretResponse>(request)
            .await
            .map_err(LeaseError::Fetch)?;

        let lease = Lease::new(
            LeaseKind::Resource,
            secret.lease_id.clone(),
            secret.lease_id,
            secret.renewable,
            Duration::from_secs(secret.lease_duration),
        );
        Ok((secret.data, lease))
    }

    fn watch(&self, lease: &Lease) -> LeaseWatcher {
        let (watcher, handle) = LeaseWatcher::channel();
        let client = self.client.clone();
        let lease = lease.clone();
        tokio::spawn(async move {
            let renew_lease = lease.clone();
            watch_lease(lease, handle, move || {
                let client = client.clone();
                let lease = renew_lease.clone();
                async move { client.renew(&lease).await }
            })
            .await
        });
        watcher
    }
}

/// Renew `lease` at two thirds of its remaining time until it cannot be
/// renewed any more.
///
/// Ends with `Done` when the lease is not renewable, a renewal fails, or the
/// granted duration drops below a third of the original one (the maximum TTL
/// is close).
pub(crate) async fn watch_lease<F, Fut>(lease: Lease, handle: WatcherHandle, mut renew: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Duration, LeaseError>>,
{
    let original = lease.duration();
    if !lease.renewable() || original.is_zero() {
        handle
            .emit(WatchEvent::Done {
                reason: Some(format!("lease {} is not renewable", lease.id())),
            })
            .await;
        return;
    }

    let mut remaining = lease.remaining();
    loop {
        tokio::select! {
            _ = handle.stopped() => return,
            _ = tokio::time::sleep(remaining * 2 / 3) => {}
        }

        let event = match renew().await {
            Ok(granted) if granted.is_zero() || granted < original / 3 => {
                WatchEvent::Done { reason: None }
            }
            Ok(granted) => {
                remaining = granted;
                WatchEvent::Renewed { remaining: granted }
            }
            Err(e) => WatchEvent::Done {
                reason: Some(e.to_string()),
            },
        };

        let done = matches!(event, WatchEvent::Done { .. });
        if !handle.emit(event).await || done {
            return;
        }
    }
}
