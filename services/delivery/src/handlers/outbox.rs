use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_auth_types::identity::IdentityHeaders;
use campus_auth_types::worker::WorkerAuthorized;
use campus_domain::id::{EventId, PersonId};
use campus_domain::outbox::OutboxStatus;

use crate::domain::types::{AccountRole, EventOutcome, OutboxEvent};
use crate::error::DeliveryServiceError;
use crate::handlers::common::require_staff;
use crate::state::AppState;
use crate::usecase::outbox::GetEventUseCase;
use crate::usecase::provision::{RequestAccountInput, RequestAccountUseCase, topic_for};

#[derive(Deserialize)]
pub struct RequestAccountBody {
    pub email: String,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct EnqueuedResponse {
    pub event_id: EventId,
    pub created: bool,
}

pub async fn request_student_account(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Path(person_id): Path<PersonId>,
    Json(body): Json<RequestAccountBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), DeliveryServiceError> {
    request_account(state, identity, AccountRole::Student, person_id, body).await
}

pub async fn request_guardian_account(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Path(person_id): Path<PersonId>,
    Json(body): Json<RequestAccountBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), DeliveryServiceError> {
    request_account(state, identity, AccountRole::Guardian, person_id, body).await
}

async fn request_account(
    state: AppState,
    identity: IdentityHeaders,
    role: AccountRole,
    person_id: PersonId,
    body: RequestAccountBody,
) -> Result<(StatusCode, Json<EnqueuedResponse>), DeliveryServiceError> {
    require_staff(&identity)?;

    let usecase = RequestAccountUseCase {
        outbox: state.outbox_repo(),
        role,
        max_attempts: state.registry.max_attempts_for(topic_for(role)),
    };
    let event_ref = usecase
        .execute(
            identity.tenant_id,
            RequestAccountInput {
                person_id,
                email: body.email,
                display_name: body.display_name,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            event_id: event_ref.id,
            created: event_ref.created,
        }),
    ))
}

#[derive(Serialize)]
pub struct EventResponse {
    pub id: EventId,
    pub topic: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms_opt")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms_opt")]
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<OutboxEvent> for EventResponse {
    fn from(e: OutboxEvent) -> Self {
        Self {
            id: e.id,
            topic: e.topic,
            status: e.status,
            attempts: e.attempts,
            max_attempts: e.max_attempts,
            next_run_at: e.next_run_at,
            created_at: e.created_at,
            processed_at: e.processed_at,
            last_error: e.last_error,
        }
    }
}

pub async fn get_event(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventResponse>, DeliveryServiceError> {
    let usecase = GetEventUseCase {
        outbox: state.outbox_repo(),
    };
    let event = usecase.execute(identity.tenant_id, event_id).await?;
    Ok(Json(event.into()))
}

#[derive(Serialize)]
pub struct WorkerRunResponse {
    pub topic: String,
    pub claimed: usize,
    pub outcomes: Vec<EventOutcome>,
}

/// Scheduler entry point: drain one batch of `topic`.
pub async fn run_worker(
    authorized: Result<WorkerAuthorized, StatusCode>,
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Result<Json<WorkerRunResponse>, DeliveryServiceError> {
    authorized.map_err(|_| DeliveryServiceError::InvalidWorkerToken)?;
    if !state.registry.contains(&topic) {
        return Err(DeliveryServiceError::UnknownTopic);
    }

    let outcomes = state.worker().run_once(&topic, Utc::now()).await?;
    Ok(Json(WorkerRunResponse {
        topic,
        claimed: outcomes.len(),
        outcomes,
    }))
}
