//! Relay and relay→hub bridge tests over the in-process transport.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use logbeam_core::RelayTransport;
use logbeam_realtime::{start_relay_bridge, Hub, HubConfig, Relay};
use logbeam_store::MemoryRelay;

fn memory_relay() -> Relay {
    Relay::new(Arc::new(MemoryRelay::new(64)))
}

#[tokio::test]
async fn test_subscribe_receives_only_listed_projects() {
    let relay = memory_relay();
    let mut feed = relay.subscribe(&["proj-1".to_string()]).await.unwrap();

    relay.publish("proj-2", &json!({"n": 0})).await.unwrap();
    relay.publish("proj-1", &json!({"n": 1})).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), feed.next())
        .await
        .expect("event within timeout")
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "log");
    assert_eq!(event.project_id, "proj-1");
    assert_eq!(event.payload["n"], 1);
}

#[tokio::test]
async fn test_subscribe_all_sees_every_project() {
    let relay = memory_relay();
    let mut feed = relay.subscribe_all().await.unwrap();

    relay.publish("a", &json!({})).await.unwrap();
    relay.publish("b", &json!({})).await.unwrap();

    let first = feed.next().await.unwrap().unwrap();
    let second = feed.next().await.unwrap().unwrap();
    assert_eq!(first.project_id, "a");
    assert_eq!(second.project_id, "b");
}

#[tokio::test]
async fn test_subscribe_requires_projects() {
    let relay = memory_relay();
    assert!(relay.subscribe(&[]).await.is_err());
}

#[tokio::test]
async fn test_bridge_delivers_to_filtered_viewers_in_order() {
    let transport = Arc::new(MemoryRelay::new(64));
    let relay = Relay::new(transport.clone());
    let cancel = CancellationToken::new();
    let hub = Hub::start(HubConfig::default(), cancel.child_token());

    let (viewer, mut rx) = hub.connection("user-1", Some("proj-1".to_string()));
    hub.register(viewer).await.unwrap();

    let bridge = start_relay_bridge(relay.clone(), hub.clone(), cancel.child_token())
        .await
        .unwrap();

    // Garbage on a project topic is skipped without stopping the bridge.
    transport
        .publish("logs:proj-1", "{broken".to_string())
        .await
        .unwrap();

    for n in 0..3 {
        relay.publish("proj-1", &json!({"n": n})).await.unwrap();
        relay.publish("proj-2", &json!({"n": n})).await.unwrap();
    }

    for n in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame within timeout")
            .unwrap();
        let msg: JsonValue = serde_json::from_str(&frame).unwrap();
        assert_eq!(msg["type"], "log");
        assert_eq!(msg["project_id"], "proj-1");
        assert_eq!(msg["data"]["n"], n);
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), bridge)
        .await
        .expect("bridge stops on cancel")
        .unwrap();
}
