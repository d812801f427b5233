//! Funding-request choreography across both services
//!
//! Portfolio and gestion-commerciale run as independent consumers on one
//! bus; the only coupling between them is the three funding topics.

mod common;

use common::{dyn_bus, producer, service_config, wait_until};
use event_bus::{EventBus, InMemoryBus};
use event_sync::{decode, ConsumerDispatcher, SchemaCompat, Topic};
use futures::StreamExt;
use gestion_commerciale_rs::handlers::FundingRequestHandler;
use gestion_commerciale_rs::registry::AcknowledgmentRegistry;
use platform_contracts::{FundingCustomerV1, FundingErrorCode};
use portfolio_rs::funding::{
    submit_funding_request, FundingAckHandler, FundingErrorHandler, FundingSagaStore, SagaState,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    bus: Arc<InMemoryBus>,
    sagas: Arc<FundingSagaStore>,
    registry: Arc<AcknowledgmentRegistry>,
    portfolio: event_sync::ProducerAdapter,
}

async fn start_both_services() -> Fixture {
    let bus = Arc::new(InMemoryBus::new());

    // Portfolio: originator, consumes the terminal events
    let sagas = Arc::new(FundingSagaStore::new());
    let portfolio = producer(&bus, "portfolio");
    let mut dispatcher = ConsumerDispatcher::new(
        dyn_bus(&bus),
        portfolio.clone(),
        &service_config("portfolio"),
    );
    dispatcher.register(
        Topic::FundingRequestAcknowledged,
        Arc::new(FundingAckHandler::new(Arc::clone(&sagas))),
    );
    dispatcher.register(
        Topic::FundingRequestError,
        Arc::new(FundingErrorHandler::new(Arc::clone(&sagas))),
    );
    Arc::new(dispatcher).start().await.unwrap();

    // Gestion-commerciale: receiver, consumes `Created`
    let registry = Arc::new(AcknowledgmentRegistry::new());
    let gestion = producer(&bus, "gestion-commerciale");
    let mut dispatcher = ConsumerDispatcher::new(
        dyn_bus(&bus),
        gestion.clone(),
        &service_config("gestion-commerciale"),
    );
    dispatcher.register(
        Topic::FundingRequestCreated,
        Arc::new(FundingRequestHandler::new(Arc::clone(&registry), gestion)),
    );
    Arc::new(dispatcher).start().await.unwrap();

    Fixture {
        bus,
        sagas,
        registry,
        portfolio,
    }
}

fn customer() -> FundingCustomerV1 {
    FundingCustomerV1 {
        customer_id: "c1".to_string(),
        email: "c1@example.com".to_string(),
        company_name: Some("ACME SAS".to_string()),
    }
}

#[tokio::test]
async fn test_created_request_reaches_acknowledged_on_both_sides() {
    let f = start_both_services().await;

    let reference =
        submit_funding_request(&f.sagas, &f.portfolio, customer(), 2_500_000, "EUR", None)
            .await
            .unwrap();

    wait_until("originator record acknowledged", Duration::from_secs(2), || {
        let sagas = Arc::clone(&f.sagas);
        let reference = reference.clone();
        async move {
            matches!(
                sagas.state(&reference),
                Some(SagaState::Acknowledged { .. })
            )
        }
    })
    .await;

    let receiver_record = f.registry.get(&reference).unwrap();
    match f.sagas.state(&reference) {
        Some(SagaState::Acknowledged { request_id }) => {
            assert_eq!(
                request_id, receiver_record.request_id,
                "both sides agree on the minted identifier"
            );
        }
        other => panic!("expected acknowledged saga, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_created_yields_one_dossier_and_same_id() {
    let f = start_both_services().await;

    let mut acks = f
        .bus
        .subscribe(Topic::FundingRequestAcknowledged.subject())
        .await
        .unwrap();

    let reference =
        submit_funding_request(&f.sagas, &f.portfolio, customer(), 2_500_000, "EUR", None)
            .await
            .unwrap();

    // Originator resubmits the same snapshot (fresh envelope id), as the
    // resubmission sweep does when an acknowledgment seems lost
    let snapshot = f.sagas.record(&reference).unwrap().snapshot;
    f.portfolio
        .publish_keyed(Topic::FundingRequestCreated, &reference, &snapshot)
        .await
        .unwrap();

    let first = decode(
        &tokio::time::timeout(Duration::from_secs(2), acks.next())
            .await
            .unwrap()
            .unwrap()
            .payload,
        SchemaCompat::Strict,
    )
    .unwrap();
    let second = decode(
        &tokio::time::timeout(Duration::from_secs(2), acks.next())
            .await
            .unwrap()
            .unwrap()
            .payload,
        SchemaCompat::Strict,
    )
    .unwrap();

    assert_eq!(first.payload["reference"], reference.as_str());
    assert_eq!(
        first.payload["requestId"], second.payload["requestId"],
        "duplicate is answered with the same minted id, not a new one"
    );
    assert_eq!(f.registry.len(), 1, "exactly one dossier on the receiver");

    wait_until("originator record acknowledged", Duration::from_secs(2), || {
        let sagas = Arc::clone(&f.sagas);
        let reference = reference.clone();
        async move {
            matches!(
                sagas.state(&reference),
                Some(SagaState::Acknowledged { .. })
            )
        }
    })
    .await;
}

#[tokio::test]
async fn test_invalid_request_reaches_errored_on_the_originator() {
    let f = start_both_services().await;

    let reference = submit_funding_request(&f.sagas, &f.portfolio, customer(), -5, "EUR", None)
        .await
        .unwrap();

    wait_until("originator record errored", Duration::from_secs(2), || {
        let sagas = Arc::clone(&f.sagas);
        let reference = reference.clone();
        async move { matches!(sagas.state(&reference), Some(SagaState::Errored { .. })) }
    })
    .await;

    assert_eq!(
        f.sagas.state(&reference),
        Some(SagaState::Errored {
            code: FundingErrorCode::InvalidAmount,
            retryable: false
        })
    );
    assert!(f.registry.is_empty(), "nothing minted for a rejected request");
}
