//! # Topic Registry
//!
//! The static catalog of every logical event name and the physical broker
//! subject it maps to. Producers and consumers both resolve through this
//! table, so the mapping cannot drift within one deployment. Two services
//! running different registry versions can still publish/consume mismatched
//! subjects; that is a deployment-coordination invariant, not one the code
//! can enforce.
//!
//! Physical subjects follow the `<owning service>.events.<logical name>`
//! convention; sync outcomes live under the shared `sync.events.*` namespace
//! because any consuming service may emit them.

/// Logical cross-service event channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    // User lifecycle (auth service)
    UserSyncRequest,
    UserLoginNotification,

    // Token transactions
    TokenPurchase,
    TokenUsage,
    TokenAlert,

    // Subscription lifecycle (payment service)
    SubscriptionCreated,
    SubscriptionStatusChanged,
    SubscriptionExpired,

    // Funding-request choreography
    FundingRequestCreated,
    FundingRequestAcknowledged,
    FundingRequestError,

    // Sync outcomes (emitted by whichever service consumed the event)
    SyncUserConfirmed,
    SyncUserFailed,
    SyncUserReconciliationRequest,

    // Knowledge-base context lifecycle (admin service)
    ContextCreated,
    ContextUpdated,
    ContextDeleted,
    ContextToggled,
    ContextExpired,
}

/// What a topic carries, which decides whether processing it reports a sync
/// outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// State-changing domain events; processing them emits an outcome
    Domain,
    /// The outcomes themselves; never re-confirmed, or outcomes would loop
    Outcome,
}

impl Topic {
    /// Every registry entry, in catalog order
    pub const ALL: [Topic; 19] = [
        Topic::UserSyncRequest,
        Topic::UserLoginNotification,
        Topic::TokenPurchase,
        Topic::TokenUsage,
        Topic::TokenAlert,
        Topic::SubscriptionCreated,
        Topic::SubscriptionStatusChanged,
        Topic::SubscriptionExpired,
        Topic::FundingRequestCreated,
        Topic::FundingRequestAcknowledged,
        Topic::FundingRequestError,
        Topic::SyncUserConfirmed,
        Topic::SyncUserFailed,
        Topic::SyncUserReconciliationRequest,
        Topic::ContextCreated,
        Topic::ContextUpdated,
        Topic::ContextDeleted,
        Topic::ContextToggled,
        Topic::ContextExpired,
    ];

    /// Logical event name, as carried in the envelope `topic` field
    pub fn logical_name(self) -> &'static str {
        match self {
            Topic::UserSyncRequest => "user.sync.request",
            Topic::UserLoginNotification => "user.login.notification",
            Topic::TokenPurchase => "token.purchase",
            Topic::TokenUsage => "token.usage",
            Topic::TokenAlert => "token.alert",
            Topic::SubscriptionCreated => "subscription.created",
            Topic::SubscriptionStatusChanged => "subscription.status-changed",
            Topic::SubscriptionExpired => "subscription.expired",
            Topic::FundingRequestCreated => "funding.request.created",
            Topic::FundingRequestAcknowledged => "funding.request.acknowledged",
            Topic::FundingRequestError => "funding.request.error",
            Topic::SyncUserConfirmed => "sync.user.confirmed",
            Topic::SyncUserFailed => "sync.user.failed",
            Topic::SyncUserReconciliationRequest => "sync.user.reconciliation.request",
            Topic::ContextCreated => "context.created",
            Topic::ContextUpdated => "context.updated",
            Topic::ContextDeleted => "context.deleted",
            Topic::ContextToggled => "context.toggled",
            Topic::ContextExpired => "context.expired",
        }
    }

    /// Physical broker subject the topic is published on
    pub fn subject(self) -> &'static str {
        match self {
            Topic::UserSyncRequest => "auth.events.user.sync.request",
            Topic::UserLoginNotification => "auth.events.user.login.notification",
            Topic::TokenPurchase => "payment.events.token.purchase",
            Topic::TokenUsage => "portfolio.events.token.usage",
            Topic::TokenAlert => "customer.events.token.alert",
            Topic::SubscriptionCreated => "payment.events.subscription.created",
            Topic::SubscriptionStatusChanged => "payment.events.subscription.status-changed",
            Topic::SubscriptionExpired => "payment.events.subscription.expired",
            Topic::FundingRequestCreated => "portfolio.events.funding.request.created",
            Topic::FundingRequestAcknowledged => "gestion.events.funding.request.acknowledged",
            Topic::FundingRequestError => "gestion.events.funding.request.error",
            Topic::SyncUserConfirmed => "sync.events.user.confirmed",
            Topic::SyncUserFailed => "sync.events.user.failed",
            Topic::SyncUserReconciliationRequest => "sync.events.user.reconciliation.request",
            Topic::ContextCreated => "admin.events.context.created",
            Topic::ContextUpdated => "admin.events.context.updated",
            Topic::ContextDeleted => "admin.events.context.deleted",
            Topic::ContextToggled => "admin.events.context.toggled",
            Topic::ContextExpired => "admin.events.context.expired",
        }
    }

    /// Whether processing this topic reports a sync outcome
    pub fn kind(self) -> TopicKind {
        match self {
            Topic::SyncUserConfirmed
            | Topic::SyncUserFailed
            | Topic::SyncUserReconciliationRequest => TopicKind::Outcome,
            _ => TopicKind::Domain,
        }
    }

    /// Look up a topic by its logical event name
    pub fn resolve(logical_name: &str) -> Option<Topic> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.logical_name() == logical_name)
    }

    /// Look up a topic by its physical broker subject
    pub fn from_subject(subject: &str) -> Option<Topic> {
        Self::ALL.iter().copied().find(|t| t.subject() == subject)
    }
}

/// Ephemeral reply subject for request/reply correlation
///
/// Derived from the requesting service and the request id, so the serving
/// side can compute it from the request envelope alone (`producer` +
/// `correlationId`) and no extra wire field is needed. Reply subjects are
/// transient by design and deliberately absent from the registry.
pub fn reply_subject(service: &str, request_id: &str) -> String {
    format!("reply.{service}.{request_id}")
}
