#![allow(clippy::unwrap_used)]
// `UpdateStream` subscription semantics over a scripted feed.

mod common;

use hearth_api::FeedMessage;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{FakeApi, WAIT, credential, snapshot};
use hearth_core::{Connectivity, StreamUpdate, UpdateStream};

async fn next(rx: &mut mpsc::UnboundedReceiver<StreamUpdate>) -> StreamUpdate {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("stream closed")
}

#[tokio::test]
async fn resubscribe_replaces_previous_handler() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    let cancel = CancellationToken::new();

    let (first, mut first_rx) = stream.subscribe_channel();
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let feed = api.feed().await;

    let (second, mut second_rx) = stream.subscribe_channel();
    assert!(!first.is_active());
    assert!(second.is_active());

    feed.send(FeedMessage::Thermostat(common::thermostat("t-1", "heat", 71)))
        .await
        .unwrap();
    let StreamUpdate::Thermostat(device) = next(&mut second_rx).await else {
        panic!("expected thermostat update");
    };
    assert_eq!(device.target_temp_f, 71);
    assert!(first_rx.try_recv().is_err());

    // A stale handle going away leaves its successor alone.
    drop(first);
    assert!(second.is_active());
    assert!(stream.has_subscriber());
    cancel.cancel();
}

#[tokio::test]
async fn first_snapshot_is_initial_then_resync() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    let cancel = CancellationToken::new();
    let (_handle, mut rx) = stream.subscribe_channel();
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let feed = api.feed().await;

    feed.send(snapshot("heat", 70)).await.unwrap();
    feed.send(snapshot("heat", 72)).await.unwrap();

    let StreamUpdate::Initial(first) = next(&mut rx).await else {
        panic!("expected initial snapshot");
    };
    assert_eq!(first.thermostats[0].target_temp_f, 70);
    let StreamUpdate::Resync(second) = next(&mut rx).await else {
        panic!("expected resync");
    };
    assert_eq!(second.thermostats[0].target_temp_f, 72);
    cancel.cancel();
}

#[tokio::test]
async fn drop_and_reconnect_signal_connectivity() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    let cancel = CancellationToken::new();
    let (_handle, mut rx) = stream.subscribe_channel();
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let feed = api.feed().await;

    // The first connect is not a restoration.
    feed.send(FeedMessage::Connected).await.unwrap();
    feed.send(FeedMessage::Disconnected {
        reason: "reset".into(),
    })
    .await
    .unwrap();
    feed.send(FeedMessage::Connected).await.unwrap();

    assert_eq!(
        next(&mut rx).await,
        StreamUpdate::Connectivity(Connectivity::Degraded {
            reason: "reset".into()
        })
    );
    assert_eq!(
        next(&mut rx).await,
        StreamUpdate::Connectivity(Connectivity::Restored)
    );
    cancel.cancel();
}

#[tokio::test]
async fn server_revocation_is_forwarded() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    let cancel = CancellationToken::new();
    let (_handle, mut rx) = stream.subscribe_channel();
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let feed = api.feed().await;

    feed.send(FeedMessage::AuthRevoked).await.unwrap();
    assert_eq!(next(&mut rx).await, StreamUpdate::AuthRevoked);
}

#[tokio::test]
async fn unsubscribe_all_is_idempotent() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    stream.unsubscribe_all();
    stream.unsubscribe_all();

    let cancel = CancellationToken::new();
    let (handle, _rx) = stream.subscribe_channel();
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    assert!(stream.is_open());

    stream.unsubscribe_all();
    assert!(!stream.is_open());
    assert!(!stream.has_subscriber());
    assert!(!handle.is_active());
    stream.unsubscribe_all();
}

#[tokio::test]
async fn reopen_closes_previous_feed() {
    let api = FakeApi::new();
    let stream = UpdateStream::new();
    let cancel = CancellationToken::new();
    let (_handle, mut rx) = stream.subscribe_channel();

    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let old_feed = api.feed().await;
    stream.open(api.as_ref(), &credential(), &cancel).await.unwrap();
    let new_feed = api.feed().await;

    new_feed.send(snapshot("cool", 75)).await.unwrap();
    assert!(matches!(next(&mut rx).await, StreamUpdate::Initial(_)));

    // The old bridge is gone, so its receiver is eventually dropped.
    tokio::time::timeout(WAIT, old_feed.closed()).await.unwrap();
    cancel.cancel();
}
