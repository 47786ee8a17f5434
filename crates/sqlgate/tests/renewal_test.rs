//! Lease renewal loop driven by a scripted secret provider.

mod common;

use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::{
    auth_lease, done, issued, next_cycle, ProviderCall, RecordingSink, ScriptedProvider,
};
use sqlgate::error::LeaseError;
use sqlgate::secrets::{LeaseKind, LeaseRenewer, RenewalState, WatchEvent};
use ProviderCall::{Fetch, Login, Watch};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_start_logs_in_then_delivers_credentials() {
    let (provider, _handles) = ScriptedProvider::new();
    provider.push_login(Ok(auth_lease("a1"))).push_fetch(issued("u1"));
    let sink = RecordingSink::default();

    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    assert_eq!(renewer.state(), RenewalState::Watching);
    assert_eq!(renewer.auth_lease().id(), "a1");
    assert_eq!(renewer.resource_lease().kind(), LeaseKind::Resource);
    assert_eq!(provider.calls(), vec![Login, Fetch]);
    assert_eq!(sink.usernames(), vec!["u1"]);
}

#[tokio::test]
async fn test_start_failure_delivers_nothing() {
    let (provider, _handles) = ScriptedProvider::new();
    provider.push_login(Err(LeaseError::Login("permission denied".to_string())));
    let sink = RecordingSink::default();

    let result = LeaseRenewer::start(provider.clone(), sink.clone(), true).await;
    assert!(matches!(result, Err(LeaseError::Login(_))));
    assert_eq!(provider.calls(), vec![Login]);
    assert!(sink.usernames().is_empty());
}

#[tokio::test]
async fn test_expiring_resource_lease_refetches_without_login() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider
        .push_login(Ok(auth_lease("a1")))
        .push_fetch(issued("u1"))
        .push_fetch(issued("u2"));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(renewer.run(cancel.clone()));

    let first = next_cycle(&mut handles, true).await;
    assert!(
        first
            .resource
            .emit(WatchEvent::Renewed {
                remaining: Duration::from_secs(60)
            })
            .await
    );
    assert!(first.resource.emit(done()).await);

    timeout(TEST_TIMEOUT, sink.wait_for(2)).await.unwrap();
    let _second = next_cycle(&mut handles, true).await;
    assert!(first.resource.is_stopped());
    assert!(first.auth.as_ref().is_some_and(|h| h.is_stopped()));

    cancel.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();

    assert_eq!(sink.usernames(), vec!["u1", "u2"]);
    assert_eq!(
        provider.calls(),
        vec![
            Login,
            Fetch,
            Watch(LeaseKind::Auth),
            Watch(LeaseKind::Resource),
            Fetch,
            Watch(LeaseKind::Auth),
            Watch(LeaseKind::Resource),
        ]
    );
}

#[tokio::test]
async fn test_expiring_auth_lease_logs_in_before_refetch() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider
        .push_login(Ok(auth_lease("a1")))
        .push_login(Ok(auth_lease("a2")))
        .push_fetch(issued("u1"))
        .push_fetch(issued("u2"));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(renewer.run(cancel.clone()));

    let first = next_cycle(&mut handles, true).await;
    let auth = first.auth.as_ref().unwrap();
    assert!(
        auth.emit(WatchEvent::Done {
            reason: Some("token revoked".to_string())
        })
        .await
    );

    timeout(TEST_TIMEOUT, sink.wait_for(2)).await.unwrap();
    let _second = next_cycle(&mut handles, true).await;
    cancel.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();

    let calls = provider.calls();
    assert_eq!(
        &calls[4..6],
        &[Login, Fetch],
        "login must precede the refetch: {:?}",
        calls
    );
}

#[tokio::test]
async fn test_refetch_keeps_renewed_auth_lifetime() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider
        .push_login(Ok(auth_lease("a1")))
        .push_fetch(issued("u1"))
        .push_fetch(issued("u2"));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(renewer.run(cancel.clone()));

    // The auth lease was issued for an hour; a renewal grants two.
    let first = next_cycle(&mut handles, true).await;
    let auth = first.auth.as_ref().unwrap();
    assert!(
        auth.emit(WatchEvent::Renewed {
            remaining: Duration::from_secs(7200)
        })
        .await
    );
    assert!(first.resource.emit(done()).await);

    timeout(TEST_TIMEOUT, sink.wait_for(2)).await.unwrap();
    let _second = next_cycle(&mut handles, true).await;
    cancel.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();

    let auth_watches: Vec<Duration> = provider
        .watched()
        .into_iter()
        .filter(|(kind, _)| *kind == LeaseKind::Auth)
        .map(|(_, remaining)| remaining)
        .collect();
    assert_eq!(auth_watches.len(), 2);
    assert!(
        auth_watches[1] > Duration::from_secs(3600),
        "second cycle watched a stale auth lease: {:?}",
        auth_watches
    );
    assert_eq!(provider.calls().iter().filter(|c| **c == Login).count(), 1);
}

#[tokio::test]
async fn test_auth_lease_not_watched_when_disabled() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider.push_login(Ok(auth_lease("a1"))).push_fetch(issued("u1"));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), false)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(renewer.run(cancel.clone()));

    let cycle = next_cycle(&mut handles, false).await;
    assert!(cycle.auth.is_none());
    cancel.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();

    assert_eq!(
        provider.calls(),
        vec![Login, Fetch, Watch(LeaseKind::Resource)]
    );
}

#[tokio::test]
async fn test_cancel_stops_watchers_and_fetches_nothing() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider.push_login(Ok(auth_lease("a1"))).push_fetch(issued("u1"));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(renewer.run(cancel.clone()));

    let cycle = next_cycle(&mut handles, true).await;
    cancel.cancel();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();

    assert!(cycle.resource.is_stopped());
    assert!(!cycle.resource.emit(done()).await);
    assert_eq!(provider.calls().iter().filter(|c| **c == Fetch).count(), 1);
    assert_eq!(sink.usernames(), vec!["u1"]);
}

#[tokio::test]
async fn test_refetch_failure_ends_loop_with_error() {
    let (provider, mut handles) = ScriptedProvider::new();
    provider
        .push_login(Ok(auth_lease("a1")))
        .push_fetch(issued("u1"))
        .push_fetch(Err(LeaseError::Fetch("role not found".to_string())));
    let sink = RecordingSink::default();
    let renewer = LeaseRenewer::start(provider.clone(), sink.clone(), true)
        .await
        .unwrap();
    let task = tokio::spawn(renewer.run(CancellationToken::new()));

    let cycle = next_cycle(&mut handles, true).await;
    assert!(cycle.resource.emit(done()).await);

    let result = timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(LeaseError::Fetch(_))));
    assert_eq!(sink.usernames(), vec!["u1"]);
}
