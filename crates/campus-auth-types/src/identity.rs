//! Gateway-injected identity headers extractor.

use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

use campus_domain::id::TenantId;

pub const X_CAMPUS_TENANT_ID: &str = "x-campus-tenant-id";
pub const X_CAMPUS_USER_ID: &str = "x-campus-user-id";
pub const X_CAMPUS_USER_ROLE: &str = "x-campus-user-role";

/// Minimum role allowed to trigger state-changing effects (school staff).
pub const ROLE_STAFF: u8 = 1;

/// Tenant and user identity injected by the gateway via `x-campus-*` headers.
///
/// Returns 401 if any header is absent or malformed.
/// Role enforcement (403) is done by handlers after extraction.
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    pub tenant_id: TenantId,
    pub user_id: Uuid,
    pub user_role: u8,
}

impl IdentityHeaders {
    pub fn is_staff(&self) -> bool {
        self.user_role >= ROLE_STAFF
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S> FromRequestParts<S> for IdentityHeaders
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    // axum-core 0.5 defines this as `fn -> impl Future + Send` (not `async fn`).
    // Extract values synchronously and return a 'static async move block.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let tenant_id = header_str(parts, X_CAMPUS_TENANT_ID).and_then(|s| s.parse::<TenantId>().ok());
        let user_id = header_str(parts, X_CAMPUS_USER_ID).and_then(|s| s.parse::<Uuid>().ok());
        let user_role = header_str(parts, X_CAMPUS_USER_ROLE).and_then(|s| s.parse::<u8>().ok());

        async move {
            let tenant_id = tenant_id.ok_or(StatusCode::UNAUTHORIZED)?;
            let user_id = user_id.ok_or(StatusCode::UNAUTHORIZED)?;
            let user_role = user_role.ok_or(StatusCode::UNAUTHORIZED)?;
            Ok(Self {
                tenant_id,
                user_id,
                user_role,
            })
        }
    }
}
