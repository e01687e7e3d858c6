//! Mock auth helpers for integration tests.
//!
//! Services behind the gateway receive `x-campus-tenant-id`, `x-campus-user-id`
//! and `x-campus-user-role` headers injected by the gateway. In tests, `MockAuth`
//! builds these headers directly so no real gateway is needed.

use http::{HeaderMap, HeaderName, HeaderValue, Request};
use uuid::Uuid;

use campus_auth_types::identity::{X_CAMPUS_TENANT_ID, X_CAMPUS_USER_ID, X_CAMPUS_USER_ROLE};
use campus_auth_types::worker::X_CAMPUS_WORKER_TOKEN;
use campus_domain::id::TenantId;

/// Configurable identity injected into test requests.
pub struct MockAuth {
    pub tenant_id: TenantId,
    pub user_id: Uuid,
    pub user_role: u8,
}

impl MockAuth {
    pub fn new(tenant_id: TenantId, user_role: u8) -> Self {
        Self {
            tenant_id,
            user_id: Uuid::new_v4(),
            user_role,
        }
    }

    /// School staff member of a fresh tenant.
    pub fn staff() -> Self {
        Self::new(TenantId::new(), 1)
    }

    /// Return headers as if the gateway injected them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        insert(&mut map, X_CAMPUS_TENANT_ID, &self.tenant_id.to_string());
        insert(&mut map, X_CAMPUS_USER_ID, &self.user_id.to_string());
        insert(&mut map, X_CAMPUS_USER_ROLE, &self.user_role.to_string());
        map
    }

    /// A bodiless request carrying the identity headers plus any extras.
    pub fn request(&self, method: &str, uri: &str, extra: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in self.headers().iter() {
            builder = builder.header(name, value);
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        builder.body(()).expect("valid test request")
    }
}

/// Headers the scheduler sends to the worker trigger.
pub fn worker_headers(token: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    insert(&mut map, X_CAMPUS_WORKER_TOKEN, token);
    map
}

fn insert(map: &mut HeaderMap, name: &'static str, value: &str) {
    map.insert(
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("valid header value"),
    );
}
