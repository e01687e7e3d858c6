use chrono::Utc;

use campus_domain::id::{PaymentId, TenantId};

use crate::domain::repository::{IdempotentRecord, IdempotentStore};
use crate::domain::types::{Payment, PaymentMethod};
use crate::error::DeliveryServiceError;
use crate::usecase::idempotency::{IdempotencyGuard, Replayable};

impl IdempotentRecord for Payment {
    fn set_idempotency_key(&mut self, key: &str) {
        self.idempotency_key = key.to_owned();
    }
}

pub struct RecordPaymentInput {
    pub invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: String,
}

struct ValidPayment {
    invoice_id: String,
    amount_cents: i64,
    currency: String,
    method: PaymentMethod,
}

fn validate(input: RecordPaymentInput) -> Result<ValidPayment, DeliveryServiceError> {
    let invoice_id = input.invoice_id.trim().to_owned();
    if invoice_id.is_empty() {
        return Err(DeliveryServiceError::validation("invoice_id is required"));
    }
    if input.amount_cents <= 0 {
        return Err(DeliveryServiceError::validation("amount_cents must be positive"));
    }
    let currency = input.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(DeliveryServiceError::validation(
            "currency must be a three-letter ISO 4217 code",
        ));
    }
    let method = PaymentMethod::parse(input.method.trim())
        .ok_or_else(|| DeliveryServiceError::validation("unsupported payment method"))?;
    Ok(ValidPayment {
        invoice_id,
        amount_cents: input.amount_cents,
        currency,
        method,
    })
}

/// Record a payment at most once per idempotency key.
pub struct RecordPaymentUseCase<S>
where
    S: IdempotentStore<Record = Payment>,
{
    pub payments: S,
}

impl<S> RecordPaymentUseCase<S>
where
    S: IdempotentStore<Record = Payment>,
{
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        idempotency_key: Option<&str>,
        input: RecordPaymentInput,
    ) -> Result<Replayable<Payment>, DeliveryServiceError> {
        let valid = validate(input)?;

        let guard = IdempotencyGuard {
            store: &self.payments,
        };
        let result = guard
            .execute(tenant_id, idempotency_key, || {
                Ok(Payment {
                    id: PaymentId::new(),
                    tenant_id,
                    invoice_id: valid.invoice_id,
                    amount_cents: valid.amount_cents,
                    currency: valid.currency,
                    method: valid.method,
                    idempotency_key: String::new(),
                    created_at: Utc::now(),
                })
            })
            .await?;

        if !result.replayed {
            tracing::info!(
                payment_id = %result.record.id,
                tenant_id = %tenant_id,
                invoice_id = %result.record.invoice_id,
                amount_cents = result.record.amount_cents,
                "payment recorded"
            );
        }
        Ok(result)
    }
}
