//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// EventBus implementation using in-memory channels
///
/// Suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Integration tests that need fast, isolated message buses
///
/// Every subscription gets its own unbounded channel, so delivery to one
/// subscriber preserves publish order and never drops messages. Queue-group
/// subscriptions sharing a (pattern, group) pair receive messages round-robin,
/// mirroring broker-side consumer groups.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("test.events.>").await?;
///
/// // Publish a message
/// bus.publish("test.events.created", b"hello".to_vec()).await?;
///
/// // Receive it
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.subject, "test.events.created");
/// assert_eq!(msg.payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    /// Round-robin cursor per (pattern, group)
    cursors: HashMap<(String, String), usize>,
}

struct Subscription {
    pattern: String,
    group: Option<String>,
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus
    pub fn new() -> Self {
        Self::default()
    }

    fn add_subscription(&self, pattern: &str, group: Option<&str>) -> BoxStream<'static, BusMessage> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.lock_state().subscriptions.push(Subscription {
            pattern: pattern.to_string(),
            group: group.map(str::to_string),
            sender,
        });

        let stream = async_stream::stream! {
            while let Some(msg) = receiver.recv().await {
                yield msg;
            }
        };
        stream.boxed()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a subject matches a subscription pattern
    ///
    /// Supports NATS-style wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more trailing tokens
    fn matches(subject: &str, pattern: &str) -> bool {
        let mut subject_tokens = subject.split('.');
        let mut pattern_tokens = pattern.split('.');

        loop {
            match (subject_tokens.next(), pattern_tokens.next()) {
                (Some(_), Some(">")) => return true,
                (Some(_), Some("*")) => {}
                (Some(s), Some(p)) if s == p => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(subject.to_string(), payload);
        self.deliver(msg);
        Ok(())
    }

    async fn publish_with_key(&self, subject: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(subject.to_string(), payload).with_key(key.to_string());
        self.deliver(msg);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        Ok(self.add_subscription(pattern, None))
    }

    async fn queue_subscribe(
        &self,
        pattern: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, BusMessage>> {
        Ok(self.add_subscription(pattern, Some(group)))
    }
}

impl InMemoryBus {
    fn deliver(&self, msg: BusMessage) {
        let mut state = self.lock_state();

        // Drop subscriptions whose receivers are gone
        state.subscriptions.retain(|s| !s.sender.is_closed());

        // Plain subscribers each get a copy
        for sub in &state.subscriptions {
            if sub.group.is_none() && Self::matches(&msg.subject, &sub.pattern) {
                let _ = sub.sender.send(msg.clone());
            }
        }

        // Queue groups get exactly one delivery per (pattern, group),
        // rotating through the members
        let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (idx, sub) in state.subscriptions.iter().enumerate() {
            if let Some(group) = &sub.group {
                if Self::matches(&msg.subject, &sub.pattern) {
                    groups
                        .entry((sub.pattern.clone(), group.clone()))
                        .or_default()
                        .push(idx);
                }
            }
        }
        for (key, members) in groups {
            let cursor = state.cursors.get(&key).copied().unwrap_or(0);
            let chosen = members[cursor % members.len()];
            let _ = state.subscriptions[chosen].sender.send(msg.clone());
            state.cursors.insert(key, cursor.wrapping_add(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    async fn next_msg(stream: &mut BoxStream<'static, BusMessage>) -> BusMessage {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended")
    }

    #[test]
    fn test_pattern_matching() {
        // Exact match
        assert!(InMemoryBus::matches(
            "auth.events.user.created",
            "auth.events.user.created"
        ));

        // Single wildcard
        assert!(InMemoryBus::matches("auth.events.user.created", "auth.*.user.created"));
        assert!(InMemoryBus::matches("auth.events.user.created", "auth.events.*.created"));
        assert!(!InMemoryBus::matches("auth.events.user.created", "auth.*.created"));

        // Multi-level wildcard
        assert!(InMemoryBus::matches("auth.events.user.created", "auth.>"));
        assert!(InMemoryBus::matches("auth.events.user.created", "auth.events.>"));
        assert!(!InMemoryBus::matches("auth.events.user.created", "billing.>"));
        assert!(!InMemoryBus::matches("auth", "auth.>"));

        // Edge cases
        assert!(InMemoryBus::matches("single", "single"));
        assert!(InMemoryBus::matches("single", "*"));
        assert!(InMemoryBus::matches("single", ">"));
        assert!(!InMemoryBus::matches("one.two", "one"));
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();

        let mut stream = bus.subscribe("test.events.>").await.unwrap();

        let payload = b"test message".to_vec();
        bus.publish("test.events.user.created", payload.clone())
            .await
            .unwrap();

        let msg = next_msg(&mut stream).await;
        assert_eq!(msg.subject, "test.events.user.created");
        assert_eq!(msg.payload, payload);
        assert_eq!(msg.key, None);
    }

    #[tokio::test]
    async fn test_publish_with_key_carries_key() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("test.>").await.unwrap();

        bus.publish_with_key("test.keyed", "user-1", b"k".to_vec())
            .await
            .unwrap();

        let msg = next_msg(&mut stream).await;
        assert_eq!(msg.key.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_messages_delivered_in_publish_order() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("test.>").await.unwrap();

        for i in 0..5 {
            let payload = format!("message {}", i).into_bytes();
            bus.publish(&format!("test.msg.{}", i), payload).await.unwrap();
        }

        for i in 0..5 {
            let msg = next_msg(&mut stream).await;
            assert_eq!(msg.subject, format!("test.msg.{}", i));
        }
    }

    #[tokio::test]
    async fn test_wildcard_filtering() {
        let bus = InMemoryBus::new();

        let mut stream = bus.subscribe("auth.events.*").await.unwrap();

        bus.publish("auth.events.created", b"match".to_vec()).await.unwrap();
        bus.publish("auth.events.deleted", b"match".to_vec()).await.unwrap();
        // Too deep
        bus.publish("auth.events.user.created", b"no match".to_vec())
            .await
            .unwrap();
        // Wrong prefix
        bus.publish("billing.events.created", b"no match".to_vec())
            .await
            .unwrap();

        assert_eq!(next_msg(&mut stream).await.subject, "auth.events.created");
        assert_eq!(next_msg(&mut stream).await.subject, "auth.events.deleted");

        let result = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(result.is_err(), "should timeout, no more messages");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = InMemoryBus::new();

        let mut stream1 = bus.subscribe("test.>").await.unwrap();
        let mut stream2 = bus.subscribe("test.>").await.unwrap();

        let payload = b"broadcast".to_vec();
        bus.publish("test.msg", payload.clone()).await.unwrap();

        assert_eq!(next_msg(&mut stream1).await.payload, payload);
        assert_eq!(next_msg(&mut stream2).await.payload, payload);
    }

    #[tokio::test]
    async fn test_queue_group_splits_deliveries() {
        let bus = InMemoryBus::new();

        let mut member1 = bus.queue_subscribe("test.>", "workers").await.unwrap();
        let mut member2 = bus.queue_subscribe("test.>", "workers").await.unwrap();

        for i in 0..4 {
            bus.publish(&format!("test.msg.{}", i), vec![i]).await.unwrap();
        }

        // Round-robin: each member sees every other message, none are duplicated
        let mut received = Vec::new();
        for _ in 0..2 {
            received.push(next_msg(&mut member1).await.payload[0]);
            received.push(next_msg(&mut member2).await.payload[0]);
        }
        received.sort_unstable();
        assert_eq!(received, vec![0, 1, 2, 3]);

        let idle1 = tokio::time::timeout(Duration::from_millis(50), member1.next()).await;
        let idle2 = tokio::time::timeout(Duration::from_millis(50), member2.next()).await;
        assert!(idle1.is_err() && idle2.is_err(), "no duplicate deliveries");
    }

    #[tokio::test]
    async fn test_distinct_groups_both_receive() {
        let bus = InMemoryBus::new();

        let mut group_a = bus.queue_subscribe("test.>", "a").await.unwrap();
        let mut group_b = bus.queue_subscribe("test.>", "b").await.unwrap();

        bus.publish("test.msg", b"fanout".to_vec()).await.unwrap();

        assert_eq!(next_msg(&mut group_a).await.payload, b"fanout");
        assert_eq!(next_msg(&mut group_b).await.payload, b"fanout");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = InMemoryBus::new();

        let stream = bus.subscribe("test.>").await.unwrap();
        drop(stream);

        // Publishing after the receiver is gone must not error
        bus.publish("test.msg", b"x".to_vec()).await.unwrap();

        let mut live = bus.subscribe("test.>").await.unwrap();
        bus.publish("test.msg", b"y".to_vec()).await.unwrap();
        assert_eq!(next_msg(&mut live).await.payload, b"y");
    }
}
