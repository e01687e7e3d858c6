//! Shared-secret guard for the internal worker trigger.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use http::StatusCode;
use http::request::Parts;

pub const X_CAMPUS_WORKER_TOKEN: &str = "x-campus-worker-token";

/// The secret the scheduler presents. Exposed to the extractor through `FromRef`.
#[derive(Clone)]
pub struct ExpectedWorkerToken(pub Arc<str>);

impl ExpectedWorkerToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), presented.as_bytes())
    }
}

impl std::fmt::Debug for ExpectedWorkerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExpectedWorkerToken(***)")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Proof that the caller presented the worker token. Rejects with 401 otherwise.
///
/// An empty configured token never matches, so a misconfigured deployment
/// refuses every trigger instead of accepting an empty header.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuthorized;

impl<S> FromRequestParts<S> for WorkerAuthorized
where
    S: Send + Sync,
    ExpectedWorkerToken: FromRef<S>,
{
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = ExpectedWorkerToken::from_ref(state);
        let authorized = parts
            .headers
            .get(X_CAMPUS_WORKER_TOKEN)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|presented| !expected.0.is_empty() && expected.matches(presented));

        async move {
            if authorized {
                Ok(Self)
            } else {
                tracing::warn!("rejected worker trigger with missing or invalid token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}
