use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use campus_core::health::healthz;
use campus_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    admission::reserve_artifact,
    health::readyz,
    outbox::{get_event, request_guardian_account, request_student_account, run_worker},
    payment::record_payment,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Account provisioning
        .route("/students/{person_id}/account", post(request_student_account))
        .route("/guardians/{person_id}/account", post(request_guardian_account))
        // Outbox
        .route("/outbox/events/{event_id}", get(get_event))
        .route("/internal/outbox/{topic}/run", post(run_worker))
        // Payments
        .route("/payments", post(record_payment))
        // Admissions
        .route("/admissions/{draft_id}/reservation", post(reserve_artifact))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
