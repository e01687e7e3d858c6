use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use campus_auth_types::identity::IdentityHeaders;
use campus_domain::id::DraftId;

use crate::error::DeliveryServiceError;
use crate::handlers::common::require_staff;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ReservationResponse {
    pub path: String,
    pub generated: bool,
}

pub async fn reserve_artifact(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Path(draft_id): Path<DraftId>,
) -> Result<Json<ReservationResponse>, DeliveryServiceError> {
    require_staff(&identity)?;

    let artifact = state
        .reserve_artifact()
        .execute(identity.tenant_id, draft_id)
        .await?;
    Ok(Json(ReservationResponse {
        path: artifact.path,
        generated: artifact.generated,
    }))
}
