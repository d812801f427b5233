use customer_rs::config::Config;
use customer_rs::handlers::{SubscriptionHandler, TokenTransactionHandler, UserSyncHandler};
use customer_rs::store::CustomerStore;
use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_sync::{BusType, ConsumerDispatcher, ProducerAdapter, Topic};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("invalid configuration");

    // The bus client is constructed once here and passed into every adapter;
    // connection lifecycle belongs to this binary, not to a container.
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
    let store = Arc::new(CustomerStore::new());

    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), producer.clone(), &config.sync);

    dispatcher.register(
        Topic::UserSyncRequest,
        Arc::new(UserSyncHandler::new(Arc::clone(&store))),
    );

    let token_handler = Arc::new(TokenTransactionHandler::new(
        Arc::clone(&store),
        producer.clone(),
        config.low_balance_threshold,
    ));
    dispatcher.register(Topic::TokenPurchase, Arc::clone(&token_handler) as _);
    dispatcher.register(Topic::TokenUsage, token_handler);

    let subscription_handler = Arc::new(SubscriptionHandler::new(Arc::clone(&store)));
    dispatcher.register(Topic::SubscriptionCreated, Arc::clone(&subscription_handler) as _);
    dispatcher.register(
        Topic::SubscriptionStatusChanged,
        Arc::clone(&subscription_handler) as _,
    );
    dispatcher.register(Topic::SubscriptionExpired, subscription_handler);

    // Login notifications are consumed by the analytics service only;
    // this service ignores them on purpose.
    dispatcher.mark_unhandled(Topic::UserLoginNotification);

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
        "customer service consuming"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutting down");
}
