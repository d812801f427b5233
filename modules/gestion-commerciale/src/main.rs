use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_sync::{BusType, ConsumerDispatcher, ProducerAdapter, Topic};
use gestion_commerciale_rs::config::Config;
use gestion_commerciale_rs::handlers::FundingRequestHandler;
use gestion_commerciale_rs::registry::AcknowledgmentRegistry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("invalid configuration");

    let bus: Arc<dyn EventBus> = match config.sync.bus_type {
        BusType::Nats => {
            let client = async_nats::connect(config.sync.broker_urls.join(","))
                .await
                .expect("failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
        BusType::InMemory => Arc::new(InMemoryBus::new()),
    };

    let producer = ProducerAdapter::new(Arc::clone(&bus), &config.sync.service_name);
    let registry = Arc::new(AcknowledgmentRegistry::new());

    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), producer.clone(), &config.sync);

    dispatcher.register(
        Topic::FundingRequestCreated,
        Arc::new(FundingRequestHandler::new(Arc::clone(&registry), producer)),
    );

    for topic in dispatcher.coverage() {
        tracing::debug!(topic = topic.logical_name(), "topic not consumed by this service");
    }

    Arc::new(dispatcher)
        .start()
        .await
        .expect("failed to start consumers");

    tracing::info!(
        service = %config.sync.service_name,
        group = %config.sync.consumer_group,
        "gestion-commerciale service consuming"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutting down");
}
