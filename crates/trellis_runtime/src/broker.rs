//! Subscription event broker.
//!
//! Maps topics to broadcast channels. A topic is a subscription field name
//! plus a fingerprint of its coerced arguments, so `onMessage(room: "a")`
//! and `onMessage(room: "b")` are independent streams.

use crate::response::Response;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Identifies one argument-distinct subscription stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    /// The subscription root field name.
    pub field: String,
    /// Canonical serialization of the coerced arguments.
    pub fingerprint: String,
}

impl TopicKey {
    /// Creates a topic key from a field name and its coerced arguments.
    pub fn new(field: impl Into<String>, arguments: &Value) -> Self {
        Self {
            field: field.into(),
            fingerprint: arguments.to_string(),
        }
    }
}

/// Fans subscription events out to argument-distinct topics.
#[derive(Debug, Clone)]
pub struct SubscriptionBroker {
    channels: Arc<RwLock<FxHashMap<TopicKey, broadcast::Sender<Value>>>>,
    capacity: usize,
    shutdown: CancellationToken,
}

impl Default for SubscriptionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionBroker {
    /// Creates a broker with the default per-topic buffer.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Creates a broker whose topics buffer up to `capacity` undelivered
    /// events. Slow consumers past the buffer lose the oldest events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(FxHashMap::default())),
            capacity,
            shutdown: CancellationToken::new(),
        }
    }

    /// Publishes an event to a topic. Returns the number of active
    /// subscribers it reached.
    pub async fn publish(&self, topic: &TopicKey, event: Value) -> usize {
        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(sender) => {
                let delivered = sender.send(event).unwrap_or(0);
                tracing::debug!(field = %topic.field, delivered, "published subscription event");
                delivered
            }
            None => 0,
        }
    }

    /// Subscribes to a topic, creating its channel if needed.
    pub async fn subscribe(&self, topic: TopicKey) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns true if the topic has at least one active subscriber.
    pub async fn has_subscribers(&self, topic: &TopicKey) -> bool {
        let channels = self.channels.read().await;
        channels
            .get(topic)
            .map(|sender| sender.receiver_count() > 0)
            .unwrap_or(false)
    }

    /// Drops topics whose last subscriber has gone away. Returns the
    /// number of topics removed.
    pub async fn cleanup(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    /// Number of live topics.
    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Terminates every stream spawned against this broker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token observed by per-subscription pump tasks.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// A stream of responses produced by one subscription.
///
/// Each event published to the topic re-executes the subscription's
/// selection set; the resulting [`Response`] arrives here.
#[derive(Debug)]
pub struct SubscriptionStream {
    receiver: mpsc::Receiver<Response>,
}

impl SubscriptionStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Response>) -> Self {
        Self { receiver }
    }

    /// Waits for the next executed event. Returns `None` once the stream
    /// has terminated (broker shutdown or topic closed).
    pub async fn next(&mut self) -> Option<Response> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_matching_topic_only() {
        let broker = SubscriptionBroker::new();
        let room_a = TopicKey::new("onMessage", &json!({"room": "a"}));
        let room_b = TopicKey::new("onMessage", &json!({"room": "b"}));

        let mut rx = broker.subscribe(room_a.clone()).await;
        assert_eq!(broker.publish(&room_a, json!({"text": "hi"})).await, 1);
        assert_eq!(broker.publish(&room_b, json!({"text": "ignored"})).await, 0);
        assert_eq!(rx.recv().await.unwrap(), json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn cleanup_drops_abandoned_topics() {
        let broker = SubscriptionBroker::new();
        let topic = TopicKey::new("onMessage", &json!({}));

        let rx = broker.subscribe(topic.clone()).await;
        assert!(broker.has_subscribers(&topic).await);
        assert_eq!(broker.cleanup().await, 0);

        drop(rx);
        assert!(!broker.has_subscribers(&topic).await);
        assert_eq!(broker.cleanup().await, 1);
        assert_eq!(broker.topic_count().await, 0);
    }
}
