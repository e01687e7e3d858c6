use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tower::ServiceExt;

use campus_delivery::config::DeliveryConfig;
use campus_delivery::handlers::payment::payment_created;
use campus_delivery::router::build_router;
use campus_delivery::state::AppState;
use campus_delivery::usecase::payment::{RecordPaymentInput, RecordPaymentUseCase};
use campus_domain::id::TenantId;
use campus_testing::auth::{MockAuth, worker_headers};

use crate::helpers::MockPaymentStore;

const WORKER_TOKEN: &str = "scheduler-secret";

/// Router over a connection that fails every query, so only paths that
/// finish before the store are expected to succeed.
fn app() -> Router {
    let vars = [
        ("DATABASE_URL", "postgres://unused"),
        ("WORKER_TOKEN", WORKER_TOKEN),
        ("ACCOUNT_DIRECTORY_URL", "http://idp.test/admin"),
        ("ACCOUNT_DIRECTORY_TOKEN", "idp-token"),
        ("OBJECT_STORE_URL", "http://objects.test"),
    ]
    .map(|(k, v)| (k.to_owned(), v.to_owned()));
    let config: DeliveryConfig = envy::from_iter(vars).unwrap();
    build_router(AppState::new(
        DatabaseConnection::Disconnected,
        reqwest::Client::new(),
        config,
    ))
}

fn payment_body() -> Value {
    json!({
        "invoice_id": "INV-2026-0042",
        "amount_cents": 45_000,
        "currency": "KES",
        "method": "card",
    })
}

fn payment_request(auth: &MockAuth, extra: &[(&str, &str)]) -> Request<Body> {
    let mut headers = vec![("content-type", "application/json")];
    headers.extend_from_slice(extra);
    let (parts, ()) = auth.request("POST", "/payments", &headers).into_parts();
    Request::from_parts(parts, Body::from(payment_body().to_string()))
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn payment_without_key_is_rejected() {
    let resp = app()
        .oneshot(payment_request(&MockAuth::staff(), &[]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["kind"], "MISSING_IDEMPOTENCY_KEY");
}

#[tokio::test]
async fn payment_by_non_staff_is_forbidden() {
    let auth = MockAuth::new(TenantId::new(), 0);
    let resp = app()
        .oneshot(payment_request(&auth, &[("idempotency-key", "pay-1")]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["kind"], "FORBIDDEN");
}

#[tokio::test]
async fn payment_without_identity_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/payments")
        .header("content-type", "application/json")
        .header("idempotency-key", "pay-1")
        .body(Body::from(payment_body().to_string()))
        .unwrap();
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn payment_store_outage_is_service_unavailable() {
    let resp = app()
        .oneshot(payment_request(&MockAuth::staff(), &[("idempotency-key", "pay-1")]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(resp).await["kind"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn replayed_payment_renders_identical_created_response() {
    let store = MockPaymentStore::default();
    let uc = RecordPaymentUseCase {
        payments: store.clone(),
    };
    let tenant = TenantId::new();
    let input = || RecordPaymentInput {
        invoice_id: "INV-2026-0042".to_owned(),
        amount_cents: 45_000,
        currency: "kes".to_owned(),
        method: "card".to_owned(),
    };

    let first = payment_created(uc.execute(tenant, Some("pay-1"), input()).await.unwrap());
    let second = payment_created(uc.execute(tenant, Some("pay-1"), input()).await.unwrap());

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CREATED);
    assert!(first.headers().get("idempotent-replayed").is_none());
    assert_eq!(second.headers()["idempotent-replayed"], "true");

    let first = to_bytes(first.into_body(), usize::MAX).await.unwrap();
    let second = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn worker_trigger_rejects_bad_token() {
    let mut request = Request::builder()
        .method("POST")
        .uri("/internal/outbox/auth_provision_student/run")
        .body(Body::empty())
        .unwrap();
    *request.headers_mut() = worker_headers("guess");
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["kind"], "INVALID_WORKER_TOKEN");
}

#[tokio::test]
async fn worker_trigger_without_token_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/internal/outbox/auth_provision_student/run")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn worker_trigger_for_unregistered_topic_is_not_found() {
    let mut request = Request::builder()
        .method("POST")
        .uri("/internal/outbox/send_newsletter/run")
        .body(Body::empty())
        .unwrap();
    *request.headers_mut() = worker_headers(WORKER_TOKEN);
    let resp = app().oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["kind"], "UNKNOWN_TOPIC");
}

#[tokio::test]
async fn readiness_reflects_database() {
    let app = app();
    let health = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let ready = Request::builder().uri("/readyz").body(Body::empty()).unwrap();

    assert_eq!(app.clone().oneshot(health).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.oneshot(ready).await.unwrap().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}
