use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use campus_auth_types::identity::IdentityHeaders;

use crate::error::DeliveryServiceError;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub const IDEMPOTENT_REPLAYED: &str = "idempotent-replayed";

/// Raw `Idempotency-Key` header. Validation is left to the idempotency guard
/// so a missing key surfaces as a typed error, not an extractor rejection.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyKey(pub Option<String>);

impl IdempotencyKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let key = parts
            .headers
            .get(IDEMPOTENCY_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        async move { Ok(Self(key)) }
    }
}

/// Write routes are for school staff only.
pub fn require_staff(identity: &IdentityHeaders) -> Result<(), DeliveryServiceError> {
    if identity.is_staff() {
        Ok(())
    } else {
        Err(DeliveryServiceError::Forbidden)
    }
}
