//! In-process at-least-once queue.
//!
//! Mirrors the delivery contract of the hosted queue: received messages stay
//! in flight until acked, and [`MemoryQueue::expire_in_flight`] plays the
//! role of a lapsed visibility timeout by making them receivable again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage, QueuePublisher};
use crate::error::QueueError;

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    body: String,
    sent_at: DateTime<Utc>,
    receive_count: u32,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Stored>,
    in_flight: HashMap<String, Stored>,
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Provider("memory queue lock poisoned".into()))
    }

    /// Return every in-flight message to the ready list.
    pub fn expire_in_flight(&self) -> Result<usize, QueueError> {
        let mut state = self.state()?;
        let expired: Vec<Stored> = state.in_flight.drain().map(|(_, m)| m).collect();
        let count = expired.len();
        state.ready.extend(expired);
        Ok(count)
    }

    /// Messages waiting to be received.
    pub fn depth(&self) -> usize {
        self.state().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Messages received but not yet acked.
    pub fn in_flight(&self) -> usize {
        self.state().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Bodies of every message not yet acked, ready ones first.
    pub fn pending_bodies(&self) -> Vec<String> {
        self.state()
            .map(|s| {
                s.ready
                    .iter()
                    .chain(s.in_flight.values())
                    .map(|m| m.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let mut state = self.state()?;
        let mut batch = Vec::new();
        while batch.len() < max_messages as usize {
            let Some(mut stored) = state.ready.pop_front() else {
                break;
            };
            stored.receive_count += 1;
            let receipt_handle = Uuid::new_v4().to_string();
            batch.push(QueueMessage {
                id: stored.id.clone(),
                body: stored.body.clone(),
                receipt_handle: receipt_handle.clone(),
                timestamp: stored.sent_at,
                attempt_count: stored.receive_count,
            });
            state.in_flight.insert(receipt_handle, stored);
        }
        Ok(batch)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.state()?
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::Ack(format!("unknown receipt handle {receipt_handle}")))
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let depth = self.state()?.ready.len() as u64;
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(depth),
            provider: "memory".to_string(),
        })
    }
}

#[async_trait]
impl QueuePublisher for MemoryQueue {
    async fn publish(&self, body: &str) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        self.state()?.ready.push_back(Stored {
            id: id.clone(),
            body: body.to_string(),
            sent_at: Utc::now(),
            receive_count: 0,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unacked_messages_are_redelivered() {
        let queue = MemoryQueue::new();
        let id = queue.publish("hello").await.unwrap();

        let first = queue.poll_batch(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);
        assert_eq!(first[0].attempt_count, 1);
        assert!(queue.poll_batch(10).await.unwrap().is_empty());

        assert_eq!(queue.expire_in_flight().unwrap(), 1);
        let second = queue.poll_batch(10).await.unwrap();
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].attempt_count, 2);
        assert_ne!(second[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = MemoryQueue::new();
        queue.publish("a").await.unwrap();
        let msg = queue.poll_batch(1).await.unwrap().remove(0);
        queue.ack(&msg.receipt_handle).await.unwrap();

        assert_eq!(queue.expire_in_flight().unwrap(), 0);
        assert_eq!(queue.depth(), 0);
        assert!(queue.ack(&msg.receipt_handle).await.is_err());
    }

    #[tokio::test]
    async fn test_health_counts_ready_messages() {
        let queue = MemoryQueue::new();
        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();
        queue.poll_batch(1).await.unwrap();

        let health = queue.health_check().await.unwrap();
        assert_eq!(health.approximate_message_count, Some(1));
        assert_eq!(queue.pending_bodies(), vec!["b", "a"]);
    }
}
