use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_auth_types::identity::IdentityHeaders;
use campus_domain::id::PaymentId;

use crate::domain::types::{Payment, PaymentMethod};
use crate::error::DeliveryServiceError;
use crate::handlers::common::{IDEMPOTENT_REPLAYED, IdempotencyKey, require_staff};
use crate::state::AppState;
use crate::usecase::idempotency::Replayable;
use crate::usecase::payment::{RecordPaymentInput, RecordPaymentUseCase};

#[derive(Deserialize)]
pub struct RecordPaymentRequest {
    pub invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: String,
}

/// Built only from stored fields, so a replay renders the same bytes as the original.
#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            invoice_id: p.invoice_id,
            amount_cents: p.amount_cents,
            currency: p.currency,
            method: p.method,
            created_at: p.created_at,
        }
    }
}

pub async fn record_payment(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    key: IdempotencyKey,
    Json(body): Json<RecordPaymentRequest>,
) -> Result<Response, DeliveryServiceError> {
    require_staff(&identity)?;

    let usecase = RecordPaymentUseCase {
        payments: state.payment_repo(),
    };
    let result = usecase
        .execute(
            identity.tenant_id,
            key.as_deref(),
            RecordPaymentInput {
                invoice_id: body.invoice_id,
                amount_cents: body.amount_cents,
                currency: body.currency,
                method: body.method,
            },
        )
        .await?;

    Ok(payment_created(result))
}

/// 201 for the first write and for every replay; only the header tells them apart.
pub fn payment_created(result: Replayable<Payment>) -> Response {
    let mut resp = (
        StatusCode::CREATED,
        Json(PaymentResponse::from(result.record)),
    )
        .into_response();
    if result.replayed {
        resp.headers_mut()
            .insert(IDEMPOTENT_REPLAYED, HeaderValue::from_static("true"));
    }
    resp
}
