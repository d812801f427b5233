//! Shared wiring for cross-service tests
//!
//! Each test runs several services in one process against a shared
//! in-memory bus, the same way the real deployment runs them against one
//! NATS cluster.
#![allow(dead_code)] // not every test file uses every helper

use event_bus::{EventBus, InMemoryBus};
use event_sync::{BusType, ProducerAdapter, SchemaCompat, SyncConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// In-memory configuration with short deadlines suitable for tests
pub fn service_config(service: &str) -> SyncConfig {
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

pub fn producer(bus: &Arc<InMemoryBus>, service: &str) -> ProducerAdapter {
    ProducerAdapter::new(Arc::clone(bus) as Arc<dyn EventBus>, service)
}

pub fn dyn_bus(bus: &Arc<InMemoryBus>) -> Arc<dyn EventBus> {
    Arc::clone(bus) as Arc<dyn EventBus>
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until<F, Fut>(what: &str, deadline: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if condition().await {
            return;
        }
        assert!(
            started.elapsed() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
