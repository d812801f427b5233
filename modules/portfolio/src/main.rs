use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_sync::{
    BusType, ConsumerDispatcher, OutcomeLedger, ProducerAdapter, ReconciliationSweep, RetryConfig,
    Topic,
};
use portfolio_rs::config::Config;
use portfolio_rs::contexts::{ContextAction, ContextCatalog, ContextEventHandler};
use portfolio_rs::funding::{
    spawn_funding_sweep, FundingAckHandler, FundingErrorHandler, FundingSagaStore,
};
use portfolio_rs::outcomes::OutcomeRecorder;
use portfolio_rs::usage::TokenUsageTracker;
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
    let sagas = Arc::new(FundingSagaStore::new());
    let catalog = Arc::new(ContextCatalog::new());
    let ledger = Arc::new(OutcomeLedger::new());
    let usage = Arc::new(TokenUsageTracker::new(producer.clone(), Arc::clone(&ledger)));

    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), producer.clone(), &config.sync);

    // Funding choreography: terminal events come back from gestion-commerciale
    dispatcher.register(
        Topic::FundingRequestAcknowledged,
        Arc::new(FundingAckHandler::new(Arc::clone(&sagas))),
    );
    dispatcher.register(
        Topic::FundingRequestError,
        Arc::new(FundingErrorHandler::new(Arc::clone(&sagas))),
    );

    // Outcomes reported by whichever service consumed our events
    let recorder = Arc::new(OutcomeRecorder::new(Arc::clone(&ledger)));
    dispatcher.register(Topic::SyncUserConfirmed, Arc::clone(&recorder) as _);
    dispatcher.register(Topic::SyncUserFailed, Arc::clone(&recorder) as _);
    dispatcher.register(Topic::SyncUserReconciliationRequest, recorder);

    // Knowledge-base context catalog mirrored from the admin service
    for (topic, action) in [
        (Topic::ContextCreated, ContextAction::Created),
        (Topic::ContextUpdated, ContextAction::Updated),
        (Topic::ContextDeleted, ContextAction::Deleted),
        (Topic::ContextToggled, ContextAction::Toggled),
        (Topic::ContextExpired, ContextAction::Expired),
    ] {
        dispatcher.register(
            topic,
            Arc::new(ContextEventHandler::new(Arc::clone(&catalog), action)),
        );
    }

    // Token alerts are customer-facing; this service ignores them on purpose
    dispatcher.mark_unhandled(Topic::TokenAlert);

    for topic in dispatcher.coverage() {
        tracing::debug!(topic = topic.logical_name(), "topic not consumed by this service");
    }

    Arc::new(dispatcher)
        .start()
        .await
        .expect("failed to start consumers");

    // Re-drive usage events whose confirmation never arrived
    let sweep = ReconciliationSweep::new(
        Arc::clone(&ledger),
        config.sync.sweep_interval,
        config.sync.sync_sla,
        RetryConfig::default(),
    );
    let sweep_usage = Arc::clone(&usage);
    sweep.spawn(move |entity_id| {
        let usage = Arc::clone(&sweep_usage);
        async move { usage.redrive(entity_id).await }
    });

    // Resubmit funding sagas stuck without a terminal event
    spawn_funding_sweep(
        Arc::clone(&sagas),
        producer.clone(),
        config.sync.sweep_interval,
        config.sync.sync_sla,
        RetryConfig {
            max_attempts: config.funding_max_attempts,
            ..RetryConfig::default()
        },
    );

    tracing::info!(
        service = %config.sync.service_name,
        group = %config.sync.consumer_group,
        "portfolio service consuming"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutting down");
}
