use std::sync::Arc;

use axum::extract::FromRef;
use sea_orm::DatabaseConnection;

use campus_auth_types::worker::ExpectedWorkerToken;
use campus_domain::outbox::{TOPIC_PROVISION_GUARDIAN, TOPIC_PROVISION_STUDENT};

use crate::config::DeliveryConfig;
use crate::domain::handler::HandlerRegistry;
use crate::domain::types::AccountRole;
use crate::infra::accounts::HttpAccountDirectory;
use crate::infra::artifact::{HttpObjectStore, ReservationDocumentRenderer};
use crate::infra::db::{DbAdmissionDraftRepository, DbOutboxRepository, DbPaymentRepository};
use crate::usecase::provision::ProvisionAccountHandler;
use crate::usecase::reservation::ReserveArtifactUseCase;
use crate::usecase::worker::OutboxWorker;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub http: reqwest::Client,
    pub registry: Arc<HandlerRegistry>,
    pub worker_token: ExpectedWorkerToken,
    pub config: Arc<DeliveryConfig>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, http: reqwest::Client, config: DeliveryConfig) -> Self {
        let registry = build_registry(account_directory(&config, &http));
        Self {
            db,
            http,
            registry: Arc::new(registry),
            worker_token: ExpectedWorkerToken::new(config.worker_token.as_str()),
            config: Arc::new(config),
        }
    }

    pub fn outbox_repo(&self) -> DbOutboxRepository {
        DbOutboxRepository {
            db: self.db.clone(),
            claim_lease_secs: self.config.claim_lease_secs,
        }
    }

    pub fn payment_repo(&self) -> DbPaymentRepository {
        DbPaymentRepository {
            db: self.db.clone(),
        }
    }

    pub fn draft_repo(&self) -> DbAdmissionDraftRepository {
        DbAdmissionDraftRepository {
            db: self.db.clone(),
        }
    }

    pub fn object_store(&self) -> HttpObjectStore {
        HttpObjectStore {
            client: self.http.clone(),
            base_url: self.config.object_store_url.clone(),
            token: self.config.object_store_token.clone(),
        }
    }

    pub fn worker(&self) -> OutboxWorker<DbOutboxRepository, DbOutboxRepository> {
        OutboxWorker::new(
            self.outbox_repo(),
            self.outbox_repo(),
            Arc::clone(&self.registry),
        )
        .with_batch_size(self.config.outbox_batch_size)
    }

    pub fn reserve_artifact(
        &self,
    ) -> ReserveArtifactUseCase<DbAdmissionDraftRepository, ReservationDocumentRenderer, HttpObjectStore>
    {
        ReserveArtifactUseCase {
            drafts: self.draft_repo(),
            renderer: ReservationDocumentRenderer,
            store: self.object_store(),
            poll_interval: self.config.artifact_poll(),
            wait_timeout: self.config.artifact_wait(),
        }
    }
}

impl FromRef<AppState> for ExpectedWorkerToken {
    fn from_ref(state: &AppState) -> Self {
        state.worker_token.clone()
    }
}

/// Outbound HTTP client shared by every collaborator.
pub fn http_client(config: &DeliveryConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
}

pub fn account_directory(config: &DeliveryConfig, http: &reqwest::Client) -> HttpAccountDirectory {
    HttpAccountDirectory {
        client: http.clone(),
        base_url: config.account_directory_url.clone(),
        token: config.account_directory_token.clone(),
    }
}

/// Every topic this deployment knows how to deliver.
pub fn build_registry(directory: HttpAccountDirectory) -> HandlerRegistry {
    HandlerRegistry::new()
        .register(
            TOPIC_PROVISION_STUDENT,
            ProvisionAccountHandler {
                directory: directory.clone(),
                role: AccountRole::Student,
            },
        )
        .register(
            TOPIC_PROVISION_GUARDIAN,
            ProvisionAccountHandler {
                directory,
                role: AccountRole::Guardian,
            },
        )
}
