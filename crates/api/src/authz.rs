//! API-side authorization guard for commands.
//!
//! Authorization is enforced at the command boundary (before dispatch), while
//! domain aggregates and infra stay auth-agnostic.

use atelier_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, TenantMembership, authorize};
use atelier_tenancy::CoreModule;

use crate::context::{PrincipalContext, TenantContext};

/// Permission families a plain `user` may exercise in full.
const USER_WRITE_FAMILIES: [&str; 3] = ["leave.*", "tickets.*", "agenda.*"];

/// Check authorization for a command in the current request context.
///
/// Must be called **before** dispatching the command.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Role→permission mapping.
///
/// `admin` grants everything in the tenant. `user` can read every core module
/// and the reference data, and fully manage its leave, tickets and agenda.
/// Unknown roles grant nothing.
pub fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::new("*")];
    }
    if !roles.iter().any(|r| r.as_str() == "user") {
        return Vec::new();
    }

    let mut grants: Vec<Permission> = CoreModule::ALL
        .into_iter()
        .map(|m| Permission::new(m.read_permission()))
        .collect();
    grants.extend(
        ["dictionaries.read", "nocode.read"]
            .into_iter()
            .chain(USER_WRITE_FAMILIES)
            .map(Permission::new),
    );
    grants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::routes::common::CmdAuth;
    use atelier_auth::PrincipalId;
    use atelier_core::TenantId;
    use atelier_tenancy::ResolutionSource;

    fn contexts(role: &'static str) -> (TenantContext, PrincipalContext) {
        let tenant_id = TenantId::new();
        (
            TenantContext::new(tenant_id, ResolutionSource::Session),
            PrincipalContext::new(PrincipalId::new(), vec![Role::new(role)], tenant_id),
        )
    }

    #[test]
    fn admin_may_do_anything() {
        let (tenant, principal) = contexts("admin");
        let cmd = CmdAuth::new((), "accounting.write");
        assert!(authorize_command(&tenant, &principal, &cmd).is_ok());
    }

    #[test]
    fn users_read_everywhere_but_write_only_their_families() {
        let (tenant, principal) = contexts("user");
        assert!(authorize_command(&tenant, &principal, &CmdAuth::new((), "invoices.read")).is_ok());
        assert!(authorize_command(&tenant, &principal, &CmdAuth::new((), "tickets.write")).is_ok());
        assert!(authorize_command(&tenant, &principal, &CmdAuth::new((), "leave.approve")).is_ok());
        assert!(matches!(
            authorize_command(&tenant, &principal, &CmdAuth::new((), "invoices.write")),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn imports_are_reserved_to_admins() {
        let (tenant, principal) = contexts("user");
        for perm in ["import.config", "import.run", "import.read"] {
            assert!(authorize_command(&tenant, &principal, &CmdAuth::new((), perm)).is_err(), "{perm}");
        }
        let (tenant, admin) = contexts("admin");
        assert!(authorize_command(&tenant, &admin, &CmdAuth::new((), "import.run")).is_ok());
    }

    #[test]
    fn unknown_roles_get_nothing() {
        let (tenant, principal) = contexts("viewer");
        assert!(authorize_command(&tenant, &principal, &CmdAuth::new((), "parties.read")).is_err());
    }
}
