use sea_orm::Database;
use tracing::info;

use campus_core::config::Config;
use campus_core::tracing::init_tracing;
use campus_delivery::config::DeliveryConfig;
use campus_delivery::router::build_router;
use campus_delivery::state::{AppState, http_client};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = DeliveryConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let http = http_client(&config).expect("failed to build HTTP client");

    let addr = format!("0.0.0.0:{}", config.delivery_port);
    let state = AppState::new(db, http, config);
    info!(
        topics = ?state.registry.topics().collect::<Vec<_>>(),
        "outbox handlers registered"
    );

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("delivery service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
