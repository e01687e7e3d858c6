use chrono::Utc;

use campus_domain::id::{EventId, TenantId};

use crate::domain::repository::OutboxRepository;
use crate::domain::types::{EventRef, NewOutboxEvent, OutboxEvent};
use crate::error::DeliveryServiceError;

pub struct EnqueueEventUseCase<R>
where
    R: OutboxRepository,
{
    pub outbox: R,
}

impl<R> EnqueueEventUseCase<R>
where
    R: OutboxRepository,
{
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        event: NewOutboxEvent,
    ) -> Result<EventRef, DeliveryServiceError> {
        event.validate().map_err(DeliveryServiceError::Validation)?;

        let event_ref = self.outbox.enqueue(tenant_id, &event, Utc::now()).await?;
        if event_ref.created {
            tracing::info!(
                event_id = %event_ref.id,
                tenant_id = %tenant_id,
                topic = %event.topic,
                "outbox event enqueued"
            );
        } else {
            tracing::debug!(
                event_id = %event_ref.id,
                tenant_id = %tenant_id,
                topic = %event.topic,
                "outbox event already enqueued under this idempotency key"
            );
        }
        Ok(event_ref)
    }
}

pub struct GetEventUseCase<R>
where
    R: OutboxRepository,
{
    pub outbox: R,
}

impl<R> GetEventUseCase<R>
where
    R: OutboxRepository,
{
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
    ) -> Result<OutboxEvent, DeliveryServiceError> {
        self.outbox
            .find(tenant_id, event_id)
            .await?
            .ok_or(DeliveryServiceError::EventNotFound)
    }
}
