use anyhow::Context as _;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use campus_domain::id::{PersonId, TenantId};
use campus_domain::outbox::{TOPIC_PROVISION_GUARDIAN, TOPIC_PROVISION_STUDENT};

use crate::domain::handler::{EventHandler, HandlerError};
use crate::domain::repository::{AccountDirectory, OutboxRepository};
use crate::domain::types::{
    AccountRole, CreateAccountOutcome, EventRef, NewAccount, NewOutboxEvent, OutboxEvent,
};
use crate::error::DeliveryServiceError;
use crate::usecase::outbox::EnqueueEventUseCase;

/// Body of `auth_provision_*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionAccountPayload {
    pub email: String,
    pub display_name: String,
    pub person_id: PersonId,
}

pub fn topic_for(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Student => TOPIC_PROVISION_STUDENT,
        AccountRole::Guardian => TOPIC_PROVISION_GUARDIAN,
    }
}

fn role_label(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Student => "student",
        AccountRole::Guardian => "guardian",
    }
}

/// One provisioning event per person and role, however often it is requested.
pub fn provision_idempotency_key(role: AccountRole, person_id: PersonId) -> String {
    format!("provision:{}:{person_id}", role_label(role))
}

pub struct RequestAccountInput {
    pub person_id: PersonId,
    pub email: String,
    pub display_name: String,
}

/// Stage account provisioning for a student or guardian.
pub struct RequestAccountUseCase<R>
where
    R: OutboxRepository,
{
    pub outbox: R,
    pub role: AccountRole,
    pub max_attempts: u32,
}

impl<R> RequestAccountUseCase<R>
where
    R: OutboxRepository,
{
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        input: RequestAccountInput,
    ) -> Result<EventRef, DeliveryServiceError> {
        let email = input.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(DeliveryServiceError::validation("email is invalid"));
        }
        let display_name = input.display_name.trim().to_owned();
        if display_name.is_empty() {
            return Err(DeliveryServiceError::validation("display_name is required"));
        }

        let payload = ProvisionAccountPayload {
            email,
            display_name,
            person_id: input.person_id,
        };
        let event = NewOutboxEvent {
            topic: topic_for(self.role).to_owned(),
            payload: serde_json::to_value(&payload).context("encode provisioning payload")?,
            idempotency_key: Some(provision_idempotency_key(self.role, input.person_id)),
            max_attempts: self.max_attempts,
        };

        let event_ref = EnqueueEventUseCase {
            outbox: &self.outbox,
        }
        .execute(tenant_id, event)
        .await?;
        tracing::info!(
            event_id = %event_ref.id,
            tenant_id = %tenant_id,
            person_id = %input.person_id,
            created = event_ref.created,
            role = role_label(self.role),
            "account provisioning requested"
        );
        Ok(event_ref)
    }
}

/// Creates the login account an `auth_provision_*` event asks for.
///
/// Re-running for an already provisioned person is a no-op, so duplicate
/// deliveries are harmless.
pub struct ProvisionAccountHandler<D>
where
    D: AccountDirectory,
{
    pub directory: D,
    pub role: AccountRole,
}

impl<D> ProvisionAccountHandler<D>
where
    D: AccountDirectory,
{
    async fn provision(&self, event: &OutboxEvent) -> Result<(), HandlerError> {
        let payload: ProvisionAccountPayload = serde_json::from_value(event.payload.clone())
            .map_err(|e| HandlerError::permanent(format!("malformed provisioning payload: {e}")))?;

        let existing = self
            .directory
            .find_by_email(&payload.email)
            .await
            .context("look up account by email")?;

        match existing {
            Some(account) if account.person_id == Some(payload.person_id) => {
                tracing::debug!(event_id = %event.id, "account already provisioned");
                return Ok(());
            }
            Some(account) if account.person_id.is_some() => {
                return Err(HandlerError::permanent(format!(
                    "email belongs to account {} of another person",
                    account.id
                )));
            }
            Some(_) | None => {}
        }

        let outcome = self
            .directory
            .create(&NewAccount {
                tenant_id: event.tenant_id,
                person_id: payload.person_id,
                email: payload.email,
                display_name: payload.display_name,
                role: self.role,
            })
            .await
            .context("create account")?;

        match outcome {
            CreateAccountOutcome::Created => {
                tracing::info!(
                    event_id = %event.id,
                    tenant_id = %event.tenant_id,
                    person_id = %payload.person_id,
                    role = role_label(self.role),
                    "account provisioned"
                );
            }
            CreateAccountOutcome::AlreadyExists => {
                tracing::debug!(event_id = %event.id, "account created by an earlier delivery");
            }
        }
        Ok(())
    }
}

impl<D> EventHandler for ProvisionAccountHandler<D>
where
    D: AccountDirectory,
{
    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(self.provision(event))
    }
}
