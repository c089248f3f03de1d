//! Per-request tenant resolution.
//!
//! Sources are tried in a fixed order: subdomain, `/t/{code}/` path prefix, the
//! session (token) tenant, the `X-Tenant-ID` header, and finally, when enabled,
//! the first active tenant.

use thiserror::Error;
use uuid::Uuid;

use atelier_core::TenantId;

/// Read access to tenant records needed for resolution.
pub trait TenantLookup {
    fn active_by_code(&self, code: &str) -> Option<TenantId>;
    fn is_active(&self, tenant_id: TenantId) -> bool;
    fn first_active(&self) -> Option<TenantId>;
}

/// The parts of a request that can designate a tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantRequest<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
    pub session_tenant: Option<TenantId>,
    pub header_tenant: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionOptions {
    /// When set, only hosts under this domain are considered for subdomain lookup.
    pub base_domain: Option<String>,
    pub fallback_to_first_active: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    Subdomain,
    PathPrefix,
    Session,
    Header,
    Fallback,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub tenant_id: TenantId,
    pub source: ResolutionSource,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("request targets tenant {requested} but the session belongs to {session}")]
    SessionMismatch { session: TenantId, requested: TenantId },
}

/// Split `/t/{code}/rest` into `(code, "/rest")`.
pub fn path_tenant_code(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/t/")?;
    let (code, tail) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if code.is_empty() { None } else { Some((code, tail)) }
}

/// First host label, when the host looks like `<code>.<domain>`.
pub fn subdomain_code<'a>(host: &'a str, base_domain: Option<&str>) -> Option<&'a str> {
    let host = host.split(':').next().unwrap_or(host);
    if let Some(base) = base_domain {
        let prefix = host.strip_suffix(base)?.strip_suffix('.')?;
        return prefix.split('.').next().filter(|s| !s.is_empty() && *s != "www");
    }
    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return None;
    }
    let (label, rest) = host.split_once('.')?;
    if rest.is_empty() || label.is_empty() || label == "www" || label == "localhost" {
        return None;
    }
    Some(label)
}

pub fn resolve_tenant(
    request: &TenantRequest<'_>,
    lookup: &impl TenantLookup,
    options: &ResolutionOptions,
) -> Result<Option<ResolvedTenant>, ResolveError> {
    let check_session = |requested: TenantId| match request.session_tenant {
        Some(session) if session != requested => {
            Err(ResolveError::SessionMismatch { session, requested })
        }
        _ => Ok(()),
    };

    let by_subdomain = request
        .host
        .and_then(|h| subdomain_code(h, options.base_domain.as_deref()))
        .and_then(|code| lookup.active_by_code(code))
        .map(|id| (id, ResolutionSource::Subdomain));
    let explicit = by_subdomain.or_else(|| {
        path_tenant_code(request.path)
            .and_then(|(code, _)| lookup.active_by_code(code))
            .map(|id| (id, ResolutionSource::PathPrefix))
    });
    if let Some((tenant_id, source)) = explicit {
        check_session(tenant_id)?;
        return Ok(Some(ResolvedTenant { tenant_id, source }));
    }

    // A header naming another active tenant than the session is a mismatch,
    // even though the session takes precedence as a source.
    let by_header = request
        .header_tenant
        .and_then(|h| Uuid::parse_str(h.trim()).ok())
        .map(TenantId::from_uuid)
        .filter(|t| lookup.is_active(*t));
    if let Some(tenant_id) = by_header {
        check_session(tenant_id)?;
    }

    if let Some(session) = request.session_tenant.filter(|t| lookup.is_active(*t)) {
        return Ok(Some(ResolvedTenant {
            tenant_id: session,
            source: ResolutionSource::Session,
        }));
    }

    if let Some(tenant_id) = by_header {
        return Ok(Some(ResolvedTenant {
            tenant_id,
            source: ResolutionSource::Header,
        }));
    }

    if options.fallback_to_first_active && request.session_tenant.is_none() {
        return Ok(lookup.first_active().map(|tenant_id| ResolvedTenant {
            tenant_id,
            source: ResolutionSource::Fallback,
        }));
    }
    Ok(None)
}
