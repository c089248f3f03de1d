use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use atelier_auth::{PrincipalId, Role};
use atelier_core::{TenantId, UserId};
use atelier_tenancy::ResolutionSource;

use crate::app::errors::json_error;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    source: ResolutionSource,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, source: ResolutionSource) -> Self {
        Self { tenant_id, source }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn source(&self) -> ResolutionSource {
        self.source
    }
}

/// Principal context for a request (authenticated identity, roles, and the
/// tenant its token was issued for).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
    session_tenant: TenantId,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>, session_tenant: TenantId) -> Self {
        Self {
            principal_id,
            roles,
            session_tenant,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn user_id(&self) -> UserId {
        self.principal_id.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn session_tenant(&self) -> TenantId {
        self.session_tenant
    }
}

/// Tenant code taken off a `/t/{code}/...` URL before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTenant(pub String);

/// Both contexts of an authenticated, tenant-scoped request.
#[derive(Debug, Clone)]
pub struct Scope {
    pub tenant: TenantContext,
    pub principal: PrincipalContext,
}

impl Scope {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant.tenant_id()
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Scope {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<PrincipalContext>()
            .cloned()
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing bearer token"))?;
        let tenant = parts
            .extensions
            .get::<TenantContext>()
            .copied()
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "tenant_required", "no tenant could be resolved"))?;
        Ok(Self { tenant, principal })
    }
}
