use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use atelier_auth::JwtValidator;
use atelier_infra::Backend;
use atelier_tenancy::{
    CoreModule, CurrentTenant, ResolutionOptions, ResolveError, TenantRequest, path_tenant_code, resolve_tenant,
};

use crate::app::errors::json_error;
use crate::context::{PathTenant, PrincipalContext, TenantContext};

pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

#[derive(Clone)]
pub struct TenantState {
    pub backend: Backend,
    pub options: Arc<ResolutionOptions>,
}

#[derive(Clone)]
pub struct ModuleGate {
    pub backend: Backend,
    pub module: CoreModule,
}

/// Runs before routing: `/t/{code}/rest` is served as `/rest`, and the code
/// is kept as a [`PathTenant`] extension for tenant resolution.
pub fn strip_tenant_prefix(mut req: Request) -> Request {
    let Some((code, rest)) = path_tenant_code(req.uri().path()) else {
        return req;
    };
    let code = code.to_string();
    let path_and_query = match req.uri().query() {
        Some(q) => format!("{rest}?{q}"),
        None => rest.to_string(),
    };

    let mut parts = req.uri().clone().into_parts();
    let Ok(pq) = path_and_query.parse() else {
        return req;
    };
    parts.path_and_query = Some(pq);
    if let Ok(uri) = Uri::from_parts(parts) {
        *req.uri_mut() = uri;
        req.extensions_mut().insert(PathTenant(code));
    }
    req
}

pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Result<Response, Response> {
    let unauthorized = |msg: &str| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", msg);

    let token = extract_bearer(req.headers()).map_err(|_| unauthorized("missing bearer token"))?;
    let claims = state
        .jwt
        .validate(token, Utc::now())
        .map_err(|e| unauthorized(&e.to_string()))?;

    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles.clone(), claims.tenant_id));

    Ok(next.run(req).await)
}

/// Resolves the request tenant and runs the rest of the stack inside its
/// task-local scope.
pub async fn tenant_middleware(
    State(state): State<TenantState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let path_prefix = req.extensions().get::<PathTenant>().map(|p| format!("/t/{}/", p.0));
    let session_tenant = req
        .extensions()
        .get::<PrincipalContext>()
        .map(PrincipalContext::session_tenant);

    let resolved = {
        let headers = req.headers();
        let request = TenantRequest {
            host: headers.get(header::HOST).and_then(|h| h.to_str().ok()),
            path: path_prefix.as_deref().unwrap_or_else(|| req.uri().path()),
            session_tenant,
            header_tenant: headers.get(TENANT_HEADER).and_then(|h| h.to_str().ok()),
        };
        resolve_tenant(&request, &state.backend.tenants, &state.options)
    };

    let resolved = match resolved {
        Ok(Some(r)) => r,
        Ok(None) => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "tenant_required",
                "no active tenant could be resolved",
            ));
        }
        Err(e @ ResolveError::SessionMismatch { .. }) => {
            return Err(json_error(StatusCode::FORBIDDEN, "tenant_mismatch", e.to_string()));
        }
    };

    debug!(tenant_id = %resolved.tenant_id, source = ?resolved.source, "tenant resolved");
    req.extensions_mut()
        .insert(TenantContext::new(resolved.tenant_id, resolved.source));

    Ok(CurrentTenant::scope(resolved.tenant_id, next.run(req)).await)
}

/// Rejects requests to a core module the tenant switched off.
pub async fn module_gate(State(gate): State<ModuleGate>, req: Request, next: Next) -> Result<Response, Response> {
    if let Some(tenant) = req.extensions().get::<TenantContext>() {
        if !gate.backend.modules.is_enabled(tenant.tenant_id(), gate.module) {
            return Err(json_error(
                StatusCode::FORBIDDEN,
                "module_disabled",
                format!("module {} is disabled for this tenant", gate.module.code()),
            ));
        }
    }
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn tenant_prefix_is_stripped_and_remembered() {
        let req = Request::builder()
            .uri("/t/acme/invoices?status=paid")
            .body(Body::empty())
            .unwrap();
        let req = strip_tenant_prefix(req);

        assert_eq!(req.uri().path(), "/invoices");
        assert_eq!(req.uri().query(), Some("status=paid"));
        assert_eq!(req.extensions().get::<PathTenant>(), Some(&PathTenant("acme".to_string())));
    }

    #[test]
    fn other_paths_are_untouched() {
        let req = Request::builder().uri("/invoices").body(Body::empty()).unwrap();
        let req = strip_tenant_prefix(req);

        assert_eq!(req.uri().path(), "/invoices");
        assert!(req.extensions().get::<PathTenant>().is_none());
    }

    #[test]
    fn bearer_token_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Ok("abc"));
    }
}
