use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Delivery service error variants.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("missing idempotency key")]
    MissingIdempotencyKey,
    #[error("invalid worker token")]
    InvalidWorkerToken,
    #[error("forbidden")]
    Forbidden,
    #[error("event not found")]
    EventNotFound,
    #[error("admission draft not found")]
    DraftNotFound,
    #[error("unknown topic")]
    UnknownTopic,
    #[error("artifact generation in progress")]
    ArtifactPending,
    #[error("artifact generation failed")]
    ArtifactFailed(#[source] anyhow::Error),
    #[error("store unavailable")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl DeliveryServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            Self::InvalidWorkerToken => "INVALID_WORKER_TOKEN",
            Self::Forbidden => "FORBIDDEN",
            Self::EventNotFound => "EVENT_NOT_FOUND",
            Self::DraftNotFound => "DRAFT_NOT_FOUND",
            Self::UnknownTopic => "UNKNOWN_TOPIC",
            Self::ArtifactPending => "ARTIFACT_PENDING",
            Self::ArtifactFailed(_) => "ARTIFACT_FAILED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingIdempotencyKey => StatusCode::BAD_REQUEST,
            Self::InvalidWorkerToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EventNotFound | Self::DraftNotFound | Self::UnknownTopic => StatusCode::NOT_FOUND,
            Self::ArtifactPending => StatusCode::CONFLICT,
            Self::ArtifactFailed(_) => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for DeliveryServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // TraceLayer already records every request; 5xx also get the anyhow chain.
        match &self {
            Self::StoreUnavailable(e) | Self::ArtifactFailed(e) => {
                tracing::error!(error = ?e, kind = self.kind(), "request failed");
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
