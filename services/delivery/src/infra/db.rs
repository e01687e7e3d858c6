use anyhow::{Context as _, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, SqlErr, Statement, UpdateMany,
};

use campus_delivery_schema::{admission_drafts, outbox_events, payments};
use campus_domain::id::{DraftId, EventId, PaymentId, TenantId};
use campus_domain::outbox::OutboxStatus;

use crate::domain::repository::{
    AdmissionDraftRepository, EventClaimer, IdempotentStore, InsertOutcome, OutboxRepository,
};
use crate::domain::types::{
    AdmissionDraft, ClaimToken, EventRef, MAX_CLAIM_LIMIT, NewOutboxEvent, OutboxEvent, Payment,
    PaymentMethod,
};
use crate::error::DeliveryServiceError;

// ── Outbox repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOutboxRepository {
    pub db: DatabaseConnection,
    /// Reclaim `processing` rows whose claim is older than this. `None` never reclaims.
    pub claim_lease_secs: Option<i32>,
}

impl OutboxRepository for DbOutboxRepository {
    async fn enqueue(
        &self,
        tenant_id: TenantId,
        event: &NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<EventRef, DeliveryServiceError> {
        let id = EventId::new();
        let model = outbox_events::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(tenant_id.into_inner()),
            topic: Set(event.topic.clone()),
            payload: Set(event.payload.clone()),
            idempotency_key: Set(event.idempotency_key.clone()),
            status: Set(OutboxStatus::Pending.as_str().to_owned()),
            attempts: Set(0),
            max_attempts: Set(i32::try_from(event.max_attempts).unwrap_or(i32::MAX)),
            next_run_at: Set(None),
            claimed_at: Set(None),
            created_at: Set(now),
            processed_at: Set(None),
            last_error: Set(None),
        };

        // A keyed duplicate (including one that loses a concurrent race) inserts nothing.
        let inserted = outbox_events::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    outbox_events::Column::TenantId,
                    outbox_events::Column::Topic,
                    outbox_events::Column::IdempotencyKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("insert outbox event")?;

        if inserted > 0 {
            return Ok(EventRef { id, created: true });
        }

        let key = event
            .idempotency_key
            .as_deref()
            .ok_or_else(|| anyhow!("outbox insert without idempotency key affected no rows"))?;
        let existing = outbox_events::Entity::find()
            .filter(outbox_events::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(outbox_events::Column::Topic.eq(event.topic.as_str()))
            .filter(outbox_events::Column::IdempotencyKey.eq(key))
            .one(&self.db)
            .await
            .context("find outbox event by idempotency key")?
            .ok_or_else(|| anyhow!("outbox event vanished after idempotency conflict"))?;

        Ok(EventRef {
            id: EventId(existing.id),
            created: false,
        })
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> Result<Option<OutboxEvent>, DeliveryServiceError> {
        let model = outbox_events::Entity::find_by_id(event_id.into_inner())
            .filter(outbox_events::Column::TenantId.eq(tenant_id.into_inner()))
            .one(&self.db)
            .await
            .context("find outbox event")?;
        Ok(model.map(event_from_model).transpose()?)
    }

    async fn mark_processed(
        &self,
        claim: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = fenced_update(claim)
            .col_expr(
                outbox_events::Column::Status,
                Expr::value(OutboxStatus::Processed.as_str()),
            )
            .col_expr(outbox_events::Column::ProcessedAt, Expr::value(now))
            .col_expr(
                outbox_events::Column::LastError,
                Expr::value(Option::<String>::None),
            )
            .exec(&self.db)
            .await
            .context("mark outbox event processed")?;
        Ok(result.rows_affected > 0)
    }

    async fn mark_failed(
        &self,
        claim: ClaimToken,
        error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = fenced_update(claim)
            .col_expr(
                outbox_events::Column::Status,
                Expr::value(OutboxStatus::Pending.as_str()),
            )
            .col_expr(outbox_events::Column::NextRunAt, Expr::value(next_run_at))
            .col_expr(outbox_events::Column::LastError, Expr::value(error))
            .exec(&self.db)
            .await
            .context("mark outbox event failed")?;
        Ok(result.rows_affected > 0)
    }

    async fn mark_dead(
        &self,
        claim: ClaimToken,
        error: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let result = fenced_update(claim)
            .col_expr(
                outbox_events::Column::Status,
                Expr::value(OutboxStatus::Dead.as_str()),
            )
            .col_expr(
                outbox_events::Column::NextRunAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(outbox_events::Column::LastError, Expr::value(error))
            .exec(&self.db)
            .await
            .context("mark outbox event dead")?;
        Ok(result.rows_affected > 0)
    }
}

/// Update scoped to the row as `claim` left it: same tenant, still
/// `processing`, and not claimed again since.
fn fenced_update(claim: ClaimToken) -> UpdateMany<outbox_events::Entity> {
    outbox_events::Entity::update_many()
        .filter(outbox_events::Column::Id.eq(claim.event_id.into_inner()))
        .filter(outbox_events::Column::TenantId.eq(claim.tenant_id.into_inner()))
        .filter(outbox_events::Column::Status.eq(OutboxStatus::Processing.as_str()))
        .filter(
            outbox_events::Column::Attempts.eq(i32::try_from(claim.attempts).unwrap_or(i32::MAX)),
        )
}

impl EventClaimer for DbOutboxRepository {
    async fn claim(
        &self,
        topic: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, DeliveryServiceError> {
        let limit = limit.clamp(1, MAX_CLAIM_LIMIT) as i32;
        let models = outbox_events::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT * FROM claim_outbox_events($1, $2, $3, $4)",
                [
                    topic.into(),
                    limit.into(),
                    now.into(),
                    self.claim_lease_secs.into(),
                ],
            ))
            .all(&self.db)
            .await
            .context("claim outbox events")?;

        let events = models
            .into_iter()
            .map(event_from_model)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(events)
    }
}

fn event_from_model(model: outbox_events::Model) -> anyhow::Result<OutboxEvent> {
    let status = model
        .status
        .parse::<OutboxStatus>()
        .with_context(|| format!("outbox event {}", model.id))?;
    Ok(OutboxEvent {
        id: EventId(model.id),
        tenant_id: TenantId(model.tenant_id),
        topic: model.topic,
        payload: model.payload,
        idempotency_key: model.idempotency_key,
        status,
        attempts: u32::try_from(model.attempts).unwrap_or(0),
        max_attempts: u32::try_from(model.max_attempts).unwrap_or(0),
        next_run_at: model.next_run_at,
        claimed_at: model.claimed_at,
        created_at: model.created_at,
        processed_at: model.processed_at,
        last_error: model.last_error,
    })
}

// ── Payment repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbPaymentRepository {
    pub db: DatabaseConnection,
}

impl IdempotentStore for DbPaymentRepository {
    type Record = Payment;

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Payment>, DeliveryServiceError> {
        let model = payments::Entity::find()
            .filter(payments::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(Expr::cust_with_values(
                "meta ->> 'idempotency_key' = $1",
                [key.to_owned()],
            ))
            .one(&self.db)
            .await
            .context("find payment by idempotency key")?;
        Ok(model.map(payment_from_model).transpose()?)
    }

    async fn insert(&self, record: &Payment) -> Result<InsertOutcome, DeliveryServiceError> {
        let model = payments::ActiveModel {
            id: Set(record.id.into_inner()),
            tenant_id: Set(record.tenant_id.into_inner()),
            invoice_id: Set(record.invoice_id.clone()),
            amount_cents: Set(record.amount_cents),
            currency: Set(record.currency.clone()),
            method: Set(record.method.as_str().to_owned()),
            meta: Set(serde_json::json!({ "idempotency_key": record.idempotency_key })),
            created_at: Set(record.created_at),
        };

        match model.insert(&self.db).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(InsertOutcome::Conflict)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert payment").into()),
        }
    }
}

fn payment_from_model(model: payments::Model) -> anyhow::Result<Payment> {
    let method = PaymentMethod::parse(&model.method)
        .ok_or_else(|| anyhow!("payment {} has unknown method {}", model.id, model.method))?;
    let idempotency_key = model
        .meta
        .get("idempotency_key")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();
    Ok(Payment {
        id: PaymentId(model.id),
        tenant_id: TenantId(model.tenant_id),
        invoice_id: model.invoice_id,
        amount_cents: model.amount_cents,
        currency: model.currency,
        method,
        idempotency_key,
        created_at: model.created_at,
    })
}

// ── Admission draft repository ────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAdmissionDraftRepository {
    pub db: DatabaseConnection,
}

impl AdmissionDraftRepository for DbAdmissionDraftRepository {
    async fn find(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
    ) -> Result<Option<AdmissionDraft>, DeliveryServiceError> {
        let model = admission_drafts::Entity::find_by_id(draft_id.into_inner())
            .filter(admission_drafts::Column::TenantId.eq(tenant_id.into_inner()))
            .one(&self.db)
            .await
            .context("find admission draft")?;
        Ok(model.map(draft_from_model))
    }

    async fn try_reserve(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let result = admission_drafts::Entity::update_many()
            .col_expr(admission_drafts::Column::ArtifactPath, Expr::value(path))
            .filter(admission_drafts::Column::Id.eq(draft_id.into_inner()))
            .filter(admission_drafts::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(admission_drafts::Column::ArtifactPath.is_null())
            .exec(&self.db)
            .await
            .context("reserve admission artifact")?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_ready(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = admission_drafts::Entity::update_many()
            .col_expr(admission_drafts::Column::ArtifactReadyAt, Expr::value(now))
            .filter(admission_drafts::Column::Id.eq(draft_id.into_inner()))
            .filter(admission_drafts::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(admission_drafts::Column::ArtifactPath.eq(path))
            .exec(&self.db)
            .await
            .context("mark admission artifact ready")?;
        Ok(result.rows_affected == 1)
    }

    async fn release(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let result = admission_drafts::Entity::update_many()
            .col_expr(
                admission_drafts::Column::ArtifactPath,
                Expr::value(Option::<String>::None),
            )
            .filter(admission_drafts::Column::Id.eq(draft_id.into_inner()))
            .filter(admission_drafts::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(admission_drafts::Column::ArtifactPath.eq(path))
            .filter(admission_drafts::Column::ArtifactReadyAt.is_null())
            .exec(&self.db)
            .await
            .context("release admission artifact reservation")?;
        Ok(result.rows_affected == 1)
    }
}

fn draft_from_model(model: admission_drafts::Model) -> AdmissionDraft {
    AdmissionDraft {
        id: DraftId(model.id),
        tenant_id: TenantId(model.tenant_id),
        applicant_name: model.applicant_name,
        grade_level: model.grade_level,
        artifact_path: model.artifact_path,
        artifact_ready_at: model.artifact_ready_at,
        created_at: model.created_at,
    }
}

/// Round-trip to the database for `/readyz`.
pub async fn ping(db: &DatabaseConnection) -> anyhow::Result<()> {
    db.ping().await.context("ping database")
}
