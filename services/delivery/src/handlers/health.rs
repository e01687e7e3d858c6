use axum::{extract::State, http::StatusCode};

use crate::infra::db::ping;
use crate::state::AppState;

/// Ready once the database answers.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match ping(&state.db).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = ?e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
