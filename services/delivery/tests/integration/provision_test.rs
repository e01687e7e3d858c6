use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use serde_json::json;

use campus_delivery::domain::handler::{EventHandler, HandlerError, HandlerRegistry};
use campus_delivery::domain::types::{AccountRole, Disposition};
use campus_delivery::error::DeliveryServiceError;
use campus_delivery::usecase::provision::{
    ProvisionAccountHandler, RequestAccountInput, RequestAccountUseCase,
};
use campus_delivery::usecase::worker::OutboxWorker;
use campus_domain::id::{PersonId, TenantId};
use campus_domain::outbox::{OutboxStatus, TOPIC_PROVISION_STUDENT};

use crate::helpers::{InMemoryOutbox, MockDirectory};

fn request(person_id: PersonId) -> RequestAccountInput {
    RequestAccountInput {
        person_id,
        email: "Amani.Student@School.test".to_owned(),
        display_name: "Amani".to_owned(),
    }
}

#[tokio::test]
async fn requesting_twice_enqueues_once() {
    let outbox = InMemoryOutbox::new();
    let uc = RequestAccountUseCase {
        outbox: outbox.clone(),
        role: AccountRole::Student,
        max_attempts: 5,
    };
    let tenant = TenantId::new();
    let person = PersonId::new();

    let first = uc.execute(tenant, request(person)).await.unwrap();
    let second = uc.execute(tenant, request(person)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(!second.created);

    let stored = outbox.get(first.id);
    assert_eq!(stored.topic, TOPIC_PROVISION_STUDENT);
    assert_eq!(
        stored.idempotency_key,
        Some(format!("provision:student:{person}"))
    );
    assert_eq!(stored.payload["email"], "amani.student@school.test");
    assert_eq!(stored.payload["person_id"], person.to_string());
}

#[tokio::test]
async fn should_reject_invalid_email() {
    let uc = RequestAccountUseCase {
        outbox: InMemoryOutbox::new(),
        role: AccountRole::Guardian,
        max_attempts: 5,
    };
    let result = uc
        .execute(
            TenantId::new(),
            RequestAccountInput {
                email: "not-an-email".to_owned(),
                ..request(PersonId::new())
            },
        )
        .await;
    assert!(matches!(result, Err(DeliveryServiceError::Validation(_))));
}

#[tokio::test]
async fn worker_provisions_account_end_to_end() {
    let outbox = InMemoryOutbox::new();
    let directory = MockDirectory::default();
    let registry = HandlerRegistry::new().register(
        TOPIC_PROVISION_STUDENT,
        ProvisionAccountHandler {
            directory: directory.clone(),
            role: AccountRole::Student,
        },
    );
    let worker = OutboxWorker::new(outbox.clone(), outbox.clone(), Arc::new(registry));

    let person = PersonId::new();
    let event_ref = RequestAccountUseCase {
        outbox: outbox.clone(),
        role: AccountRole::Student,
        max_attempts: 5,
    }
    .execute(TenantId::new(), request(person))
    .await
    .unwrap();

    let outcomes = worker.run_once(TOPIC_PROVISION_STUDENT, Utc::now()).await.unwrap();
    assert_eq!(outcomes[0].disposition, Disposition::Processed);
    assert_eq!(outbox.get(event_ref.id).status, OutboxStatus::Processed);

    let accounts = directory.accounts.lock().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].person_id, Some(person));
}

#[tokio::test]
async fn rerunning_for_provisioned_person_does_not_create_again() {
    let outbox = InMemoryOutbox::new();
    let person = PersonId::new();
    let directory = MockDirectory::with_account("kid@school.test", Some(person));
    let handler = ProvisionAccountHandler {
        directory: directory.clone(),
        role: AccountRole::Student,
    };
    let id = outbox.seed(
        TenantId::new(),
        TOPIC_PROVISION_STUDENT,
        json!({ "email": "kid@school.test", "display_name": "Kid", "person_id": person }),
        5,
    );

    handler.handle(&outbox.get(id)).await.unwrap();
    handler.handle(&outbox.get(id)).await.unwrap();
    assert_eq!(directory.creates(), 0);
}

#[tokio::test]
async fn conflict_on_create_counts_as_provisioned() {
    let outbox = InMemoryOutbox::new();
    let directory = MockDirectory {
        conflict_on_create: true,
        ..MockDirectory::default()
    };
    let handler = ProvisionAccountHandler {
        directory: directory.clone(),
        role: AccountRole::Guardian,
    };
    let id = outbox.seed(
        TenantId::new(),
        "auth_provision_guardian",
        json!({ "email": "parent@home.test", "display_name": "Parent", "person_id": PersonId::new() }),
        5,
    );

    handler.handle(&outbox.get(id)).await.unwrap();
    assert_eq!(directory.creates(), 1);
}

#[tokio::test]
async fn malformed_payload_is_permanent() {
    let outbox = InMemoryOutbox::new();
    let handler = ProvisionAccountHandler {
        directory: MockDirectory::default(),
        role: AccountRole::Student,
    };
    let id = outbox.seed(TenantId::new(), TOPIC_PROVISION_STUDENT, json!({ "email": 42 }), 5);

    let err = handler.handle(&outbox.get(id)).await.unwrap_err();
    assert!(matches!(err, HandlerError::Permanent(_)), "got {err:?}");
}

#[tokio::test]
async fn directory_outage_is_transient() {
    let outbox = InMemoryOutbox::new();
    let directory = MockDirectory::default();
    directory.offline.store(true, Ordering::SeqCst);
    let handler = ProvisionAccountHandler {
        directory: directory.clone(),
        role: AccountRole::Student,
    };
    let id = outbox.seed(
        TenantId::new(),
        TOPIC_PROVISION_STUDENT,
        json!({ "email": "kid@school.test", "display_name": "Kid", "person_id": PersonId::new() }),
        5,
    );

    let err = handler.handle(&outbox.get(id)).await.unwrap_err();
    assert!(matches!(err, HandlerError::Transient(_)), "got {err:?}");
    assert_eq!(directory.creates(), 0);
}

#[tokio::test]
async fn email_owned_by_another_person_is_permanent() {
    let outbox = InMemoryOutbox::new();
    let directory = MockDirectory::with_account("shared@home.test", Some(PersonId::new()));
    let handler = ProvisionAccountHandler {
        directory: directory.clone(),
        role: AccountRole::Guardian,
    };
    let id = outbox.seed(
        TenantId::new(),
        "auth_provision_guardian",
        json!({ "email": "shared@home.test", "display_name": "Other", "person_id": PersonId::new() }),
        5,
    );

    let err = handler.handle(&outbox.get(id)).await.unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(directory.creates(), 0);
}

#[tokio::test]
async fn request_goes_through_event_validation() {
    let outbox = InMemoryOutbox::new();
    let uc = RequestAccountUseCase {
        outbox: outbox.clone(),
        role: AccountRole::Student,
        max_attempts: 0,
    };

    let result = uc.execute(TenantId::new(), request(PersonId::new())).await;
    assert!(
        matches!(&result, Err(DeliveryServiceError::Validation(m)) if m.contains("max_attempts")),
        "got {result:?}"
    );
    assert!(outbox.all().is_empty());
}
