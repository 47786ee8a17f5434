//! Service wiring.

use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::control::{bind_control_channel, CredentialPusher};
use crate::database::{
    register_database_commands, ConnectionParams, MySqlConnector, ResourceHandle,
};
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::secrets::{LeaseRenewer, VaultProvider};
use crate::transport::Context;

/// Run the database service until `shutdown` resolves or a task fails.
///
/// With a `vault` section the control channel is bound first, then the lease
/// renewer logs in and pushes the first credentials through it. Without one
/// the handle connects once with the configured credentials.
pub async fn run_until<F>(config: &Config, context: Context, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let handle = ResourceHandle::shared(
        MySqlConnector::new(),
        ConnectionParams::from(&config.database),
    );
    let cancel = CancellationToken::new();

    let mut control_task: Option<JoinHandle<Result<()>>> = None;
    let mut renewal_task = None;

    if let Some(vault) = &config.vault {
        info!("Credential rotation enabled, secret store at {}", vault.address);
        let control =
            bind_control_channel::<MySqlConnector>(&context, &config.service.control_endpoint)
                .await?;
        control_task = Some(tokio::spawn(control.serve(Arc::clone(&handle))));

        let provider = VaultProvider::new(vault)?;
        let sink = CredentialPusher::connect(&context, &config.service.control_endpoint).await?;
        let renewer = LeaseRenewer::start(provider, sink, vault.secure).await?;
        renewal_task = Some(tokio::spawn(renewer.run(cancel.clone())));
    } else {
        info!("Credential rotation disabled, using configured credentials");
        handle
            .reconnect(config.database.credentials.to_credentials())
            .await?;
    }

    let mut dispatcher = Dispatcher::bind_reply(&context, "database", &config.service.url).await?;
    register_database_commands(&mut dispatcher);
    let mut dispatcher_task = tokio::spawn(dispatcher.serve(Arc::clone(&handle)));

    let result = tokio::select! {
        _ = shutdown => {
            info!("Shutdown requested");
            Ok(())
        }
        joined = &mut dispatcher_task => flatten("database dispatcher", joined),
        joined = async {
            match renewal_task.as_mut() {
                Some(task) => task.await,
                None => std::future::pending().await,
            }
        } => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::Lease(e)),
            Err(e) => Err(task_failed("lease renewer", e)),
        },
    };

    cancel.cancel();
    if let Some(task) = renewal_task {
        if !task.is_finished() {
            if let Err(e) = task.await {
                debug!("Lease renewer ended abnormally: {}", e);
            }
        }
    }
    dispatcher_task.abort();
    if let Some(task) = control_task {
        task.abort();
    }

    if let Err(e) = handle.close().await {
        warn!("Failed to close the database connection: {}", e);
    }
    result
}

fn flatten(name: &str, joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(task_failed(name, e)),
    }
}

fn task_failed(name: &str, err: JoinError) -> GatewayError {
    GatewayError::Task(format!("{}: {}", name, err))
}
