//! Redis backend tests.
//!
//! These need a running Redis server and are ignored by default:
//!
//! ```text
//! REDIS_URL=redis://localhost:6379 cargo test -p logbeam-store -- --ignored
//! ```

use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use logbeam_core::{CounterStore, QueueStore, RelayTransport};
use logbeam_store::{RedisRelay, RedisStore};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// A key no other test run will touch.
fn unique(prefix: &str) -> String {
    format!("logbeam-test:{prefix}:{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_counter_increments_and_expires() {
    let store = RedisStore::connect(&redis_url()).await.unwrap();
    let key = unique("counter");

    assert_eq!(store.incr_with_expiry(&key, Duration::from_secs(1)).await.unwrap(), 1);
    assert_eq!(store.incr_with_expiry(&key, Duration::from_secs(1)).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.incr_with_expiry(&key, Duration::from_secs(1)).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_queue_fifo_and_timeout() {
    let store = RedisStore::connect(&redis_url()).await.unwrap();
    let queue = unique("queue");

    store.push_back(&queue, "first".to_string()).await.unwrap();
    store.push_back(&queue, "second".to_string()).await.unwrap();
    assert_eq!(store.len(&queue).await.unwrap(), 2);

    let timeout = Duration::from_millis(200);
    assert_eq!(
        store.pop_front_blocking(&queue, timeout).await.unwrap().as_deref(),
        Some("first")
    );
    assert_eq!(
        store.pop_front_blocking(&queue, timeout).await.unwrap().as_deref(),
        Some("second")
    );
    assert!(store.pop_front_blocking(&queue, timeout).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_pattern_subscription_receives_publish() {
    let relay = RedisRelay::connect(&redis_url()).await.unwrap();
    let project = Uuid::new_v4().to_string();
    let topic = format!("logs:{project}");

    let mut feed = relay.psubscribe("logs:*").await.unwrap();
    relay.publish(&topic, "payload".to_string()).await.unwrap();

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), feed.next())
            .await
            .expect("message within timeout")
            .unwrap()
            .unwrap();
        // Other publishers may share the server.
        if msg.topic == topic {
            assert_eq!(msg.payload, "payload");
            break;
        }
    }
}
