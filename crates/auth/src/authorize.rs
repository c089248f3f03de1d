use thiserror::Error;

use atelier_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A principal resolved for one request: who, acting in which tenant, with what grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Commands that declare the permissions they need.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Check `required` against the principal's grants in its active tenant.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal.membership.permissions.iter().any(|p| p.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(tenant: TenantId, membership_tenant: TenantId, perms: &[&'static str]) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant,
            membership: TenantMembership {
                tenant_id: membership_tenant,
                roles: vec![Role::new("user")],
                permissions: perms.iter().map(|p| Permission::new(*p)).collect(),
            },
        }
    }

    #[test]
    fn wildcard_allows_everything() {
        let t = TenantId::new();
        let p = principal(t, t, &["*"]);
        assert!(authorize(&p, &Permission::new("invoices.validate")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let t = TenantId::new();
        let p = principal(t, t, &["tickets.*"]);
        assert_eq!(
            authorize(&p, &Permission::new("invoices.validate")),
            Err(AuthzError::Forbidden("invoices.validate".to_string()))
        );
        assert!(authorize(&p, &Permission::new("tickets.comment")).is_ok());
    }

    #[test]
    fn membership_of_another_tenant_is_rejected() {
        let p = principal(TenantId::new(), TenantId::new(), &["*"]);
        assert_eq!(
            authorize(&p, &Permission::new("parties.read")),
            Err(AuthzError::TenantMismatch)
        );
    }
}
