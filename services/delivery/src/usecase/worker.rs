use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::handler::{HandlerError, HandlerRegistry};
use crate::domain::repository::{EventClaimer, OutboxRepository};
use crate::domain::types::{
    DEFAULT_BATCH_SIZE, Disposition, EventOutcome, MAX_CLAIM_LIMIT, MAX_LAST_ERROR_LEN,
    OutboxEvent, RetryPolicy,
};
use crate::error::DeliveryServiceError;

/// Drains due outbox events through the registered handlers.
///
/// Each claimed event ends in exactly one of `processed`, back to `pending`
/// with a later `next_run_at`, or `dead`. Handler failures are recorded on the
/// event; only store failures surface as errors.
pub struct OutboxWorker<C, R>
where
    C: EventClaimer,
    R: OutboxRepository,
{
    pub claimer: C,
    pub outbox: R,
    pub registry: Arc<HandlerRegistry>,
    pub batch_size: u32,
    pub retry: RetryPolicy,
}

impl<C, R> OutboxWorker<C, R>
where
    C: EventClaimer,
    R: OutboxRepository,
{
    pub fn new(claimer: C, outbox: R, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            claimer,
            outbox,
            registry,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_CLAIM_LIMIT);
        self
    }

    /// Claim one batch of `topic` and run every event through its handler, in claim order.
    pub async fn run_once(
        &self,
        topic: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventOutcome>, DeliveryServiceError> {
        let events = self.claimer.claim(topic, self.batch_size, now).await?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(topic, claimed = events.len(), "claimed outbox events");

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            let result = match self.registry.get(&event.topic) {
                Some(handler) => handler.handle(&event).await,
                None => Err(HandlerError::permanent(format!(
                    "no handler registered for topic {}",
                    event.topic
                ))),
            };
            outcomes.push(self.settle(event, result, now).await?);
        }
        Ok(outcomes)
    }

    async fn settle(
        &self,
        event: OutboxEvent,
        result: Result<(), HandlerError>,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, DeliveryServiceError> {
        let (disposition, error, matched) = match result {
            Ok(()) => {
                let matched = self
                    .outbox
                    .mark_processed(event.claim_token(), now)
                    .await?;
                (Disposition::Processed, None, matched)
            }
            Err(err) => {
                let message = truncate(&describe(&err));
                if err.is_permanent() || event.is_last_attempt() {
                    let matched = self
                        .outbox
                        .mark_dead(event.claim_token(), &message)
                        .await?;
                    tracing::warn!(
                        event_id = %event.id,
                        tenant_id = %event.tenant_id,
                        topic = %event.topic,
                        attempts = event.attempts,
                        error = %message,
                        "outbox event dead-lettered"
                    );
                    (Disposition::Dead, Some(message), matched)
                } else {
                    let next_run_at = self.retry.next_run_at(now, event.attempts);
                    let matched = self
                        .outbox
                        .mark_failed(event.claim_token(), &message, next_run_at)
                        .await?;
                    tracing::info!(
                        event_id = %event.id,
                        tenant_id = %event.tenant_id,
                        topic = %event.topic,
                        attempts = event.attempts,
                        %next_run_at,
                        error = %message,
                        "outbox event failed, retry scheduled"
                    );
                    (Disposition::Retrying { next_run_at }, Some(message), matched)
                }
            }
        };

        if !matched {
            tracing::warn!(
                event_id = %event.id,
                tenant_id = %event.tenant_id,
                "outbox event was no longer processing when its result was recorded"
            );
        }

        Ok(EventOutcome {
            event_id: event.id,
            tenant_id: event.tenant_id,
            topic: event.topic,
            attempts: event.attempts,
            disposition,
            error,
        })
    }

    /// Poll `topics` until `shutdown` resolves.
    ///
    /// Sleeps `poll_interval` whenever a full pass claims nothing. A store
    /// failure is logged and the pass retried after the same interval.
    pub async fn run_forever<F>(&self, topics: &[String], poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let mut drained = 0usize;
            for topic in topics {
                match self.run_once(topic, Utc::now()).await {
                    Ok(outcomes) => drained += outcomes.len(),
                    Err(e) => {
                        tracing::error!(error = ?e, topic = %topic, "outbox worker pass failed");
                    }
                }
            }

            let idle = if drained > 0 {
                Duration::ZERO
            } else {
                poll_interval
            };
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("outbox worker stopping");
                    return;
                }
                _ = tokio::time::sleep(idle) => {}
            }
        }
    }
}

fn describe(err: &HandlerError) -> String {
    match err {
        HandlerError::Transient(e) => format!("{e:#}"),
        HandlerError::Permanent(message) => message.clone(),
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_LAST_ERROR_LEN).collect()
}
