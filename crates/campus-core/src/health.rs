use axum::http::StatusCode;

/// `GET /healthz`: the process is up. Readiness is service-specific.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
