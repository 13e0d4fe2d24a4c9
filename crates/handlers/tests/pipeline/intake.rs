use std::sync::Arc;

use serde_json::json;

use sourcetrack_core::{Predicate, SourceType};
use sourcetrack_handlers::{HandlerError, Intake};
use sourcetrack_queue::{DiscoveryMessage, MemoryQueue, QueueConsumer, QueuePublisher};
use sourcetrack_tracker::TrackerStore;

use crate::helpers::{bucket_attrs, Env};

fn body(name: &str) -> String {
    DiscoveryMessage::new(SourceType::ObjectStore, bucket_attrs(name))
        .to_body()
        .unwrap()
}

#[tokio::test]
async fn test_same_discovery_twice_yields_one_record() {
    let env = Env::new();
    let queue = Arc::new(MemoryQueue::new());
    queue.publish(&body("b1")).await.unwrap();
    queue.publish(&body("b1")).await.unwrap();

    let report = Intake::new(env.store.clone(), queue.clone()).drain(10).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert!(report.is_clean());
    assert_eq!(env.store.scan(&Predicate::all()).await.unwrap().len(), 1);
    assert_eq!(queue.depth() + queue.in_flight(), 0);
}

#[tokio::test]
async fn test_redelivered_invocation_is_harmless() {
    let env = Env::new();
    let queue = Arc::new(MemoryQueue::new());
    queue.publish(&body("b1")).await.unwrap();
    let msg = queue.poll_batch(1).await.unwrap().remove(0);

    let event = json!({
        "Records": [{
            "messageId": msg.id,
            "receiptHandle": msg.receipt_handle,
            "body": msg.body,
            "attributes": { "ApproximateReceiveCount": "1" }
        }]
    });
    let intake = Intake::new(env.store.clone(), queue.clone());
    let first = intake.handle_event(&event).await.unwrap();
    assert_eq!(first.inserted, 1);

    // The second delivery's ack targets an already-deleted receipt; the record
    // is still not duplicated and the invocation completes.
    let second = intake.handle_event(&event).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(env.store.scan(&Predicate::all()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unacked_message_comes_back_until_processed() {
    let env = Env::new();
    let queue = Arc::new(MemoryQueue::new());
    queue.publish(&body("b1")).await.unwrap();

    // A consumer that received the message but died before processing it.
    queue.poll_batch(1).await.unwrap();
    assert_eq!(queue.expire_in_flight().unwrap(), 1);

    let report = Intake::new(env.store.clone(), queue.clone()).drain(10).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(queue.depth() + queue.in_flight(), 0);
}

#[tokio::test]
async fn test_broken_envelope_is_malformed() {
    let env = Env::new();
    let intake = Intake::new(env.store.clone(), Arc::new(MemoryQueue::new()));

    for event in [
        json!({ "Records": [] }),
        json!({ "Records": [{ "body": "{}" }] }),
        json!({ "source_type": "s3", "source_attributes": { "bucketName": "b1" } }),
    ] {
        let err = intake.handle_event(&event).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedEvent(_)), "{event}");
    }
    assert!(env.store.scan(&Predicate::all()).await.unwrap().is_empty());
}
