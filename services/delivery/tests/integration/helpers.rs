use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use campus_delivery::domain::handler::{EventHandler, HandlerError};
use campus_delivery::domain::repository::{
    AccountDirectory, AdmissionDraftRepository, ArtifactRenderer, ArtifactStore, EventClaimer,
    IdempotentStore, InsertOutcome, OutboxRepository,
};
use campus_delivery::domain::types::{
    Account, AdmissionDraft, ClaimToken, CreateAccountOutcome, EventRef, NewAccount,
    NewOutboxEvent, OutboxEvent, Payment,
};
use campus_delivery::error::DeliveryServiceError;
use campus_domain::id::{DraftId, EventId, PersonId, TenantId};
use campus_domain::outbox::OutboxStatus;

// ── InMemoryOutbox ───────────────────────────────────────────────────────────

/// Outbox whose claim runs entirely under one lock, so it is atomic like the
/// SQL function.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    pub events: Arc<Mutex<Vec<OutboxEvent>>>,
    pub fail_claims: Arc<AtomicBool>,
    pub fail_marks: Arc<AtomicBool>,
    /// Reclaim `processing` rows claimed this long ago. `None` never reclaims.
    pub lease: Option<chrono::Duration>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(lease: chrono::Duration) -> Self {
        Self {
            lease: Some(lease),
            ..Self::default()
        }
    }

    pub fn get(&self, id: EventId) -> OutboxEvent {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .expect("event exists")
    }

    pub fn all(&self) -> Vec<OutboxEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Insert a pending event directly, bypassing validation.
    pub fn seed(
        &self,
        tenant_id: TenantId,
        topic: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> EventId {
        let id = EventId::new();
        self.events.lock().unwrap().push(OutboxEvent {
            id,
            tenant_id,
            topic: topic.to_owned(),
            payload,
            idempotency_key: None,
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts,
            next_run_at: None,
            claimed_at: None,
            created_at: Utc::now(),
            processed_at: None,
            last_error: None,
        });
        id
    }

    fn mark(
        &self,
        claim: ClaimToken,
        apply: impl FnOnce(&mut OutboxEvent),
    ) -> Result<bool, DeliveryServiceError> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(anyhow!("outbox store offline").into());
        }
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| {
            e.id == claim.event_id
                && e.tenant_id == claim.tenant_id
                && e.status == OutboxStatus::Processing
                && e.attempts == claim.attempts
        }) {
            Some(event) => {
                apply(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl OutboxRepository for InMemoryOutbox {
    async fn enqueue(
        &self,
        tenant_id: TenantId,
        event: &NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<EventRef, DeliveryServiceError> {
        let mut events = self.events.lock().unwrap();
        if let Some(key) = &event.idempotency_key {
            if let Some(existing) = events.iter().find(|e| {
                e.tenant_id == tenant_id
                    && e.topic == event.topic
                    && e.idempotency_key.as_deref() == Some(key.as_str())
            }) {
                return Ok(EventRef {
                    id: existing.id,
                    created: false,
                });
            }
        }
        let id = EventId::new();
        events.push(OutboxEvent {
            id,
            tenant_id,
            topic: event.topic.clone(),
            payload: event.payload.clone(),
            idempotency_key: event.idempotency_key.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts: event.max_attempts,
            next_run_at: None,
            claimed_at: None,
            created_at: now,
            processed_at: None,
            last_error: None,
        });
        Ok(EventRef { id, created: true })
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> Result<Option<OutboxEvent>, DeliveryServiceError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == event_id && e.tenant_id == tenant_id)
            .cloned())
    }

    async fn mark_processed(
        &self,
        claim: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        self.mark(claim, |e| {
            e.status = OutboxStatus::Processed;
            e.processed_at = Some(now);
            e.last_error = None;
        })
    }

    async fn mark_failed(
        &self,
        claim: ClaimToken,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        self.mark(claim, |e| {
            e.status = OutboxStatus::Pending;
            e.next_run_at = Some(next_run_at);
            e.last_error = Some(error.to_owned());
        })
    }

    async fn mark_dead(
        &self,
        claim: ClaimToken,
        error: &str,
    ) -> Result<bool, DeliveryServiceError> {
        self.mark(claim, |e| {
            e.status = OutboxStatus::Dead;
            e.next_run_at = None;
            e.last_error = Some(error.to_owned());
        })
    }
}

impl EventClaimer for InMemoryOutbox {
    async fn claim(
        &self,
        topic: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, DeliveryServiceError> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(anyhow!("outbox store offline").into());
        }
        let mut events = self.events.lock().unwrap();
        let mut due: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.topic == topic && e.is_claimable(now, self.lease))
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| {
            let e = &events[i];
            (e.next_run_at.unwrap_or(e.created_at), e.created_at)
        });
        due.truncate(limit as usize);

        Ok(due
            .into_iter()
            .map(|i| {
                let e = &mut events[i];
                e.status = OutboxStatus::Processing;
                e.attempts += 1;
                e.next_run_at = None;
                e.claimed_at = Some(now);
                e.clone()
            })
            .collect())
    }
}

// ── Scripted handlers ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub enum Script {
    Succeed,
    /// Transient failure for the first `n` calls, then success.
    FailFirst(u32),
    AlwaysFail,
    Permanent,
    /// Transient failure whenever the payload has `"fail": true`.
    FailFlagged,
}

/// Handler whose behaviour is fixed up front; `calls` counts invocations.
#[derive(Clone)]
pub struct ScriptedHandler {
    pub script: Script,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedHandler {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EventHandler for ScriptedHandler {
    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.script {
                Script::Succeed => Ok(()),
                Script::FailFirst(n) if call <= n => Err(anyhow!("upstream timeout").into()),
                Script::FailFirst(_) => Ok(()),
                Script::AlwaysFail => Err(anyhow!("upstream 503").into()),
                Script::Permanent => Err(HandlerError::permanent("payload rejected")),
                Script::FailFlagged => {
                    if event.payload["fail"].as_bool() == Some(true) {
                        Err(anyhow!("flagged to fail").into())
                    } else {
                        Ok(())
                    }
                }
            }
        })
    }
}

// ── MockPaymentStore ─────────────────────────────────────────────────────────

/// Payment store with a unique (tenant, key) check on insert. Lookups yield
/// first so concurrent callers can interleave between lookup and insert.
#[derive(Clone, Default)]
pub struct MockPaymentStore {
    pub records: Arc<Mutex<Vec<Payment>>>,
}

impl IdempotentStore for MockPaymentStore {
    type Record = Payment;

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Payment>, DeliveryServiceError> {
        tokio::task::yield_now().await;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.idempotency_key == key)
            .cloned())
    }

    async fn insert(&self, record: &Payment) -> Result<InsertOutcome, DeliveryServiceError> {
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|p| p.tenant_id == record.tenant_id && p.idempotency_key == record.idempotency_key)
        {
            return Ok(InsertOutcome::Conflict);
        }
        records.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
}

// ── MockDraftRepo ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockDraftRepo {
    pub drafts: Arc<Mutex<HashMap<DraftId, AdmissionDraft>>>,
    /// `mark_ready` fails with a store error this many more times.
    pub mark_ready_failures: Arc<AtomicU32>,
}

impl MockDraftRepo {
    pub fn with_draft(tenant_id: TenantId) -> (Self, DraftId) {
        let repo = Self::default();
        let id = DraftId::new();
        repo.drafts.lock().unwrap().insert(
            id,
            AdmissionDraft {
                id,
                tenant_id,
                applicant_name: "Ada Okafor".to_owned(),
                grade_level: "G7".to_owned(),
                artifact_path: None,
                artifact_ready_at: None,
                created_at: Utc::now(),
            },
        );
        (repo, id)
    }

    pub fn get(&self, id: DraftId) -> AdmissionDraft {
        self.drafts.lock().unwrap().get(&id).cloned().expect("draft exists")
    }
}

impl AdmissionDraftRepository for MockDraftRepo {
    async fn find(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
    ) -> Result<Option<AdmissionDraft>, DeliveryServiceError> {
        Ok(self
            .drafts
            .lock()
            .unwrap()
            .get(&draft_id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned())
    }

    async fn try_reserve(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let mut drafts = self.drafts.lock().unwrap();
        match drafts.get_mut(&draft_id) {
            Some(d) if d.tenant_id == tenant_id && d.artifact_path.is_none() => {
                d.artifact_path = Some(path.to_owned());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_ready(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let failing = self
            .mark_ready_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("draft store offline").into());
        }
        let mut drafts = self.drafts.lock().unwrap();
        match drafts.get_mut(&draft_id) {
            Some(d) if d.tenant_id == tenant_id && d.artifact_path.as_deref() == Some(path) => {
                d.artifact_ready_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let mut drafts = self.drafts.lock().unwrap();
        match drafts.get_mut(&draft_id) {
            Some(d)
                if d.tenant_id == tenant_id
                    && d.artifact_path.as_deref() == Some(path)
                    && d.artifact_ready_at.is_none() =>
            {
                d.artifact_path = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ── Artifact doubles ─────────────────────────────────────────────────────────

/// Renderer that takes `delay` of (virtual) time and counts renders.
#[derive(Clone)]
pub struct SlowRenderer {
    pub delay: Duration,
    pub renders: Arc<AtomicU32>,
}

impl SlowRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            renders: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl ArtifactRenderer for SlowRenderer {
    async fn render(&self, draft: &AdmissionDraft) -> anyhow::Result<Vec<u8>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("reservation for {}", draft.applicant_name).into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}

/// Object store that fails its first `failures` uploads.
#[derive(Clone, Default)]
pub struct MockObjectStore {
    pub objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub failures: Arc<AtomicU32>,
}

impl MockObjectStore {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: Arc::new(AtomicU32::new(times)),
            ..Self::default()
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl ArtifactStore for MockObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(anyhow!("object store returned 500"));
        }
        self.objects.lock().unwrap().insert(path.to_owned(), bytes);
        Ok(())
    }
}

// ── MockDirectory ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockDirectory {
    pub accounts: Arc<Mutex<Vec<Account>>>,
    pub creates: Arc<AtomicU32>,
    /// Lookups fail with a transport error while this is set.
    pub offline: Arc<AtomicBool>,
    /// Create answers "conflict" without storing anything.
    pub conflict_on_create: bool,
}

impl MockDirectory {
    pub fn with_account(email: &str, person_id: Option<PersonId>) -> Self {
        let directory = Self::default();
        directory.accounts.lock().unwrap().push(Account {
            id: "acct-1".to_owned(),
            email: email.to_owned(),
            person_id,
        });
        directory
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }
}

impl AccountDirectory for MockDirectory {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn create(&self, account: &NewAccount) -> anyhow::Result<CreateAccountOutcome> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.conflict_on_create {
            return Ok(CreateAccountOutcome::AlreadyExists);
        }
        let mut accounts = self.accounts.lock().unwrap();
        let next = accounts.len() + 1;
        accounts.push(Account {
            id: format!("acct-{next}"),
            email: account.email.clone(),
            person_id: Some(account.person_id),
        });
        Ok(CreateAccountOutcome::Created)
    }
}
