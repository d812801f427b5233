//! Shared helpers for event-sync integration tests
#![allow(dead_code)] // not every test file uses every helper

use event_bus::BusMessage;
use event_sync::{decode, BusType, Envelope, SchemaCompat, SyncConfig};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;

/// In-memory configuration with short deadlines suitable for tests
pub fn test_config(service: &str) -> SyncConfig {
    SyncConfig {
        broker_urls: vec!["nats://localhost:4222".to_string()],
        bus_type: BusType::InMemory,
        service_name: service.to_string(),
        consumer_group: format!("{service}-workers"),
        schema_compat: SchemaCompat::Strict,
        correlation_timeout: Duration::from_millis(500),
        handler_timeout: Duration::from_millis(500),
        sync_sla: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(50),
    }
}

/// Await the next message on a subscription and decode its envelope
pub async fn recv_envelope(stream: &mut BoxStream<'static, BusMessage>) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended");
    decode(&msg.payload, SchemaCompat::Strict).expect("undecodable envelope")
}

/// Assert that no message arrives within the window
pub async fn assert_silent(stream: &mut BoxStream<'static, BusMessage>, window: Duration) {
    let result = tokio::time::timeout(window, stream.next()).await;
    assert!(result.is_err(), "expected no further events");
}
