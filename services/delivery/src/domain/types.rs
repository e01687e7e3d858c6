use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use campus_domain::id::{DraftId, EventId, PaymentId, PersonId, TenantId};
use campus_domain::outbox::OutboxStatus;

/// Dead-letter ceiling used when a topic does not configure its own.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Events claimed per worker invocation.
pub const DEFAULT_BATCH_SIZE: u32 = 25;

/// Upper bound on a single claim, whatever the caller asks for.
pub const MAX_CLAIM_LIMIT: u32 = 500;

/// Backoff unit: the first retry waits this long.
pub const BACKOFF_BASE_MINUTES: i64 = 5;

/// Backoff multiplier cap: delays stop growing at `BASE * CAP` (300 minutes).
pub const BACKOFF_CAP_MULTIPLIER: i64 = 60;

/// Longest handler error message persisted in `last_error`.
pub const MAX_LAST_ERROR_LEN: usize = 2000;

/// Longest accepted idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

// ── Outbox ───────────────────────────────────────────────────────────────────

/// Durable record of an intended side effect.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub status: OutboxStatus,
    /// Claims so far. Incremented by the claim itself, not by failure reporting.
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_run_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    /// Claimable right now (ignoring any lease reclaim).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.next_run_at.is_none_or(|at| at <= now)
    }

    /// Stuck in `processing` past `lease`. `None` never expires.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease: Option<Duration>) -> bool {
        match (lease, self.claimed_at) {
            (Some(lease), Some(claimed_at)) => {
                self.status == OutboxStatus::Processing && claimed_at <= now - lease
            }
            _ => false,
        }
    }

    /// The claim rule: due and pending, or holding an expired lease.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: Option<Duration>) -> bool {
        self.is_due(now) || self.lease_expired(now, lease)
    }

    pub fn claim_token(&self) -> ClaimToken {
        ClaimToken {
            tenant_id: self.tenant_id,
            event_id: self.id,
            attempts: self.attempts,
        }
    }

    /// Whether a failure on this claim exhausts the retry budget.
    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Identifies one claim of an event.
///
/// Every claim bumps `attempts`, so a mark carrying a stale count (from a
/// worker whose lease was reclaimed) matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimToken {
    pub tenant_id: TenantId,
    pub event_id: EventId,
    pub attempts: u32,
}

/// Request to stage a side effect.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub max_attempts: u32,
}

impl NewOutboxEvent {
    /// A missing topic or a `null` payload is rejected before anything is queued.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic is required".to_owned());
        }
        if self.payload.is_null() {
            return Err("payload is required".to_owned());
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err("idempotency key must not be blank".to_owned());
            }
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(format!(
                    "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} characters"
                ));
            }
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_owned());
        }
        Ok(())
    }
}

/// Handle returned by enqueue. `created` is false when an existing event with the
/// same idempotency key was returned instead of inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRef {
    pub id: EventId,
    pub created: bool,
}

/// Capped exponential backoff between handler retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap_multiplier: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::minutes(BACKOFF_BASE_MINUTES),
            cap_multiplier: BACKOFF_CAP_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// `min(cap, 2^(attempts - 1)) * base`.
    ///
    /// `attempts` is the count after the failing claim, so the first failure
    /// waits exactly `base`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(62);
        let multiplier = (1i64 << exponent).min(self.cap_multiplier);
        self.base * multiplier as i32
    }

    pub fn next_run_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        now + self.backoff(attempts)
    }
}

/// What the worker did with one claimed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Processed,
    Retrying {
        #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
        next_run_at: DateTime<Utc>,
    },
    Dead,
}

/// Per-event result of one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub topic: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub disposition: Disposition,
    pub error: Option<String>,
}

impl EventOutcome {
    /// Status the row was left in.
    pub fn status(&self) -> OutboxStatus {
        match self.disposition {
            Disposition::Processed => OutboxStatus::Processed,
            Disposition::Retrying { .. } => OutboxStatus::Failed,
            Disposition::Dead => OutboxStatus::Dead,
        }
    }
}

// ── Payments ─────────────────────────────────────────────────────────────────

/// A payment against an invoice, written behind the idempotency guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    /// Persisted as `meta.idempotency_key`.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "card" => Some(Self::Card),
            "bank_transfer" => Some(Self::BankTransfer),
            _ => None,
        }
    }
}

// ── Admissions ───────────────────────────────────────────────────────────────

/// Admission draft whose `artifact_path` is the single-winner mutex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDraft {
    pub id: DraftId,
    pub tenant_id: TenantId,
    pub applicant_name: String,
    pub grade_level: String,
    pub artifact_path: Option<String>,
    pub artifact_ready_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdmissionDraft {
    pub fn is_reserved(&self) -> bool {
        self.artifact_path.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.artifact_path.is_some() && self.artifact_ready_at.is_some()
    }
}

/// Deterministic object key, so every caller agrees on where the artifact lives.
pub fn reservation_artifact_path(tenant_id: TenantId, draft_id: DraftId) -> String {
    format!("{tenant_id}/admissions/{draft_id}/reservation.json")
}

// ── Accounts ─────────────────────────────────────────────────────────────────

/// Login account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub person_id: Option<PersonId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Student,
    Guardian,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub email: String,
    pub display_name: String,
    pub role: AccountRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAccountOutcome {
    Created,
    AlreadyExists,
}
