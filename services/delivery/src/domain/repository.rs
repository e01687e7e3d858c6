#![allow(async_fn_in_trait)]

use std::future::Future;

use chrono::{DateTime, Utc};

use campus_domain::id::{DraftId, EventId, TenantId};

use crate::domain::types::{
    Account, AdmissionDraft, ClaimToken, CreateAccountOutcome, EventRef, NewAccount, NewOutboxEvent,
    OutboxEvent,
};
use crate::error::DeliveryServiceError;

/// Durable outbox. Every method except `claim` (see [`EventClaimer`]) is tenant-scoped.
pub trait OutboxRepository: Send + Sync {
    /// Insert a pending event. With an idempotency key already used for the
    /// same tenant and topic, the existing event is returned with `created = false`.
    async fn enqueue(
        &self,
        tenant_id: TenantId,
        event: &NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<EventRef, DeliveryServiceError>;

    async fn find(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> Result<Option<OutboxEvent>, DeliveryServiceError>;

    /// The mark operations only touch the row while it is still `processing`
    /// under the claim that `claim` came from. `false` means nothing matched.
    async fn mark_processed(
        &self,
        claim: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;

    /// Record a retryable failure: the row returns to `pending` until `next_run_at`.
    async fn mark_failed(
        &self,
        claim: ClaimToken,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;

    async fn mark_dead(
        &self,
        claim: ClaimToken,
        error: &str,
    ) -> Result<bool, DeliveryServiceError>;
}

impl<T> OutboxRepository for &T
where
    T: OutboxRepository,
{
    async fn enqueue(
        &self,
        tenant_id: TenantId,
        event: &NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<EventRef, DeliveryServiceError> {
        (**self).enqueue(tenant_id, event, now).await
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> Result<Option<OutboxEvent>, DeliveryServiceError> {
        (**self).find(tenant_id, event_id).await
    }

    async fn mark_processed(
        &self,
        claim: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        (**self).mark_processed(claim, now).await
    }

    async fn mark_failed(
        &self,
        claim: ClaimToken,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        (**self).mark_failed(claim, error, next_run_at).await
    }

    async fn mark_dead(
        &self,
        claim: ClaimToken,
        error: &str,
    ) -> Result<bool, DeliveryServiceError> {
        (**self).mark_dead(claim, error).await
    }
}

/// Atomic claim of due events for one topic, across tenants.
///
/// Implementations must guarantee that concurrent callers never receive the
/// same event. Claimed events come back as `processing` with `attempts`
/// already incremented.
pub trait EventClaimer: Send + Sync {
    async fn claim(
        &self,
        topic: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, DeliveryServiceError>;
}

/// Records that carry an idempotency key in their metadata.
pub trait IdempotentRecord: Clone + Send + Sync {
    fn set_idempotency_key(&mut self, key: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already holds this (tenant, key).
    Conflict,
}

/// Storage behind [`crate::usecase::idempotency::IdempotencyGuard`].
pub trait IdempotentStore: Send + Sync {
    type Record: IdempotentRecord;

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Self::Record>, DeliveryServiceError>;

    async fn insert(&self, record: &Self::Record) -> Result<InsertOutcome, DeliveryServiceError>;
}

impl<T> IdempotentStore for &T
where
    T: IdempotentStore,
{
    type Record = T::Record;

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Self::Record>, DeliveryServiceError> {
        (**self).find_by_key(tenant_id, key).await
    }

    async fn insert(&self, record: &Self::Record) -> Result<InsertOutcome, DeliveryServiceError> {
        (**self).insert(record).await
    }
}

/// Admission drafts, with `artifact_path` doubling as a generation mutex.
pub trait AdmissionDraftRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
    ) -> Result<Option<AdmissionDraft>, DeliveryServiceError>;

    /// Set `artifact_path` only where it is still null. `true` means this caller won.
    async fn try_reserve(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError>;

    async fn mark_ready(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;

    /// Undo a reservation that never became ready.
    async fn release(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError>;
}

/// Identity provider admin API.
///
/// Called from event handlers, which run behind `dyn` and need `Send` futures,
/// hence the explicit signatures.
pub trait AccountDirectory: Send + Sync {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Account>>> + Send;

    fn create(
        &self,
        account: &NewAccount,
    ) -> impl Future<Output = anyhow::Result<CreateAccountOutcome>> + Send;
}

pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, draft: &AdmissionDraft) -> anyhow::Result<Vec<u8>>;

    fn content_type(&self) -> &'static str;
}

pub trait ArtifactStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;
}
