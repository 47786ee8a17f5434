//! Control channel delivering new database credentials.
//!
//! The control channel is a one-way dispatcher on an `inproc://` endpoint.
//! It serves a single command, `new-credentials`, pushed by the lease renewal
//! loop through a [`CredentialPusher`].

use async_trait::async_trait;
use bytes::Bytes;
use sqlgate_protocol::{command, Parameters, Reply, Request};
use tokio::sync::Mutex;

use crate::credentials::Credentials;
use crate::database::{Connector, SharedHandle};
use crate::dispatcher::{CommandHandler, Dispatcher};
use crate::error::{GatewayError, LeaseError, Result};
use crate::secrets::CredentialSink;
use crate::transport::{Context, Endpoint, PushSocket};

/// Default in-process endpoint of the control channel.
pub const CONTROL_ENDPOINT: &str = "inproc://database_renew";

pub const INVALID_CREDENTIALS: &str = "the received database credentials are invalid";

/// Applies pushed credentials with [`ResourceHandle::reconnect`].
///
/// Each message gets exactly one reconnect attempt bounded by the handle's
/// timeout. A failed attempt leaves the previous connection in place.
///
/// [`ResourceHandle::reconnect`]: crate::database::ResourceHandle::reconnect
#[derive(Debug, Clone, Copy, Default)]
pub struct NewCredentialsHandler;

#[async_trait]
impl<K: Connector> CommandHandler<SharedHandle<K>> for NewCredentialsHandler {
    async fn handle(&self, request: &Request, handle: &SharedHandle<K>) -> Reply {
        let credentials: Credentials = match request.decode_parameters() {
            Ok(credentials) => credentials,
            Err(_) => return Reply::fail(INVALID_CREDENTIALS),
        };
        if !credentials.is_valid() {
            return Reply::fail(INVALID_CREDENTIALS);
        }

        match handle.reconnect(credentials).await {
            Ok(()) => Reply::ok(Parameters::new()),
            Err(e) => Reply::fail(format!("database reconnect failed: {}", e)),
        }
    }
}

/// Bind the control channel and register `new-credentials`.
///
/// Only `inproc://` endpoints are accepted.
pub async fn bind_control_channel<K: Connector>(
    context: &Context,
    endpoint: &str,
) -> Result<Dispatcher<SharedHandle<K>>> {
    if !Endpoint::parse(endpoint)?.is_inproc() {
        return Err(GatewayError::Config(format!(
            "control channel must use an inproc:// endpoint, got {}",
            endpoint
        )));
    }

    let mut dispatcher = Dispatcher::bind_pull(context, "control", endpoint).await?;
    dispatcher.register_command(command::NEW_CREDENTIALS, NewCredentialsHandler);
    Ok(dispatcher)
}

/// Pushes credentials to a control channel.
pub struct CredentialPusher {
    socket: Mutex<PushSocket>,
}

impl CredentialPusher {
    pub async fn connect(context: &Context, endpoint: &str) -> Result<Self> {
        let socket = PushSocket::connect(context, endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl CredentialSink for CredentialPusher {
    async fn deliver(&self, credentials: &Credentials) -> std::result::Result<(), LeaseError> {
        let payload = Request::from_serializable(command::NEW_CREDENTIALS, credentials)
            .and_then(|request| request.to_bytes())
            .map_err(|e| LeaseError::Delivery(e.to_string()))?;

        let mut socket = self.socket.lock().await;
        socket
            .push(Bytes::from(payload))
            .await
            .map_err(|e| LeaseError::Delivery(e.to_string()))?;
        debug!(
            "Pushed credentials for {} to {}",
            credentials.username,
            socket.endpoint()
        );
        Ok(())
    }
}
