use anyhow::anyhow;

use campus_domain::id::TenantId;

use crate::domain::repository::{IdempotentRecord, IdempotentStore, InsertOutcome};
use crate::domain::types::MAX_IDEMPOTENCY_KEY_LEN;
use crate::error::DeliveryServiceError;

/// A record plus whether it came from an earlier request with the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayable<T> {
    pub record: T,
    pub replayed: bool,
}

/// Accept a client-supplied key, trimmed. Absent or blank keys are refused.
pub fn validate_idempotency_key(key: Option<&str>) -> Result<&str, DeliveryServiceError> {
    let key = key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(DeliveryServiceError::MissingIdempotencyKey)?;
    if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(DeliveryServiceError::validation(format!(
            "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(key)
}

/// Turns a create into "create once per (tenant, key)".
///
/// The unique index on the key is what makes this safe under concurrency:
/// the lookup only short-circuits the common retry case.
pub struct IdempotencyGuard<S>
where
    S: IdempotentStore,
{
    pub store: S,
}

impl<S> IdempotencyGuard<S>
where
    S: IdempotentStore,
{
    pub async fn execute<F>(
        &self,
        tenant_id: TenantId,
        key: Option<&str>,
        build: F,
    ) -> Result<Replayable<S::Record>, DeliveryServiceError>
    where
        F: FnOnce() -> Result<S::Record, DeliveryServiceError>,
    {
        let key = validate_idempotency_key(key)?;

        if let Some(record) = self.store.find_by_key(tenant_id, key).await? {
            tracing::debug!(tenant_id = %tenant_id, "replaying idempotent write");
            return Ok(Replayable {
                record,
                replayed: true,
            });
        }

        let mut record = build()?;
        record.set_idempotency_key(key);

        match self.store.insert(&record).await? {
            InsertOutcome::Inserted => Ok(Replayable {
                record,
                replayed: false,
            }),
            InsertOutcome::Conflict => {
                tracing::debug!(tenant_id = %tenant_id, "lost idempotent insert race, replaying winner");
                let winner = self
                    .store
                    .find_by_key(tenant_id, key)
                    .await?
                    .ok_or_else(|| anyhow!("idempotent record vanished after key conflict"))?;
                Ok(Replayable {
                    record: winner,
                    replayed: true,
                })
            }
        }
    }
}
