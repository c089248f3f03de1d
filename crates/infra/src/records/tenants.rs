use chrono::{DateTime, Utc};
use tracing::info;

use atelier_core::{DomainError, TenantId};
use atelier_tenancy::{CurrentTenant, RegisterTenant, Tenant, TenantLookup, unique_code};

use super::{Dictionaries, ModuleSettings, RecordBackend, RecordResult, Records, platform};

/// Registry of tenants. Tenant rows live in the platform partition.
#[derive(Clone)]
pub struct TenantDirectory {
    tenants: Records<Tenant>,
    dictionaries: Dictionaries,
    modules: ModuleSettings,
}

impl TenantDirectory {
    pub fn new(backend: &RecordBackend, dictionaries: Dictionaries, modules: ModuleSettings) -> Self {
        Self {
            tenants: backend.store("tenants"),
            dictionaries,
            modules,
        }
    }

    /// Allocate a unique code, create the tenant, seed its dictionaries and
    /// enable every core module.
    pub fn register(&self, cmd: &RegisterTenant, now: DateTime<Utc>) -> RecordResult<Tenant> {
        let all = self.list();
        let code = unique_code(&cmd.base_code(), |candidate| all.iter().any(|t| t.code == candidate));
        let tenant = Tenant::register(TenantId::new(), cmd, code, now)?;
        self.tenants.upsert(platform(), tenant.id.to_string(), tenant.clone())?;

        CurrentTenant::sync_scope(tenant.id, || -> RecordResult<()> {
            self.dictionaries.seed_defaults(tenant.id, now)?;
            self.modules.enable_all(tenant.id)
        })?;

        info!(tenant_id = %tenant.id, code = %tenant.code, plan = tenant.plan.code(), "tenant registered");
        Ok(tenant)
    }

    pub fn find_by_id(&self, tenant_id: TenantId) -> Option<Tenant> {
        self.tenants.get(platform(), &tenant_id.to_string())
    }

    /// Codes are stored lower-case; the lookup ignores case.
    pub fn find_active_by_code(&self, code: &str) -> Option<Tenant> {
        let code = code.trim().to_lowercase();
        self.list().into_iter().find(|t| t.active && t.code == code)
    }

    /// Oldest active tenant.
    pub fn first_active(&self) -> Option<Tenant> {
        self.list()
            .into_iter()
            .filter(|t| t.active)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.code.cmp(&b.code)))
    }

    /// Sorted by code.
    pub fn list(&self) -> Vec<Tenant> {
        let mut tenants = self.tenants.list(platform());
        tenants.sort_by(|a, b| a.code.cmp(&b.code));
        tenants
    }

    pub fn set_active(&self, tenant_id: TenantId, active: bool, now: DateTime<Utc>) -> RecordResult<Tenant> {
        let mut tenant = self.find_by_id(tenant_id).ok_or(DomainError::NotFound)?;
        tenant.active = active;
        tenant.updated_at = now;
        self.tenants.upsert(platform(), tenant_id.to_string(), tenant.clone())?;
        info!(tenant_id = %tenant_id, active, "tenant activation changed");
        Ok(tenant)
    }
}

impl TenantLookup for TenantDirectory {
    fn active_by_code(&self, code: &str) -> Option<TenantId> {
        self.find_active_by_code(code).map(|t| t.id)
    }

    fn is_active(&self, tenant_id: TenantId) -> bool {
        self.find_by_id(tenant_id).is_some_and(|t| t.active)
    }

    fn first_active(&self) -> Option<TenantId> {
        TenantDirectory::first_active(self).map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_tenancy::{CoreModule, DictionaryType};

    fn directory() -> TenantDirectory {
        let backend = RecordBackend::Memory;
        TenantDirectory::new(&backend, Dictionaries::new(&backend), ModuleSettings::new(&backend))
    }

    fn signup(name: &str) -> RegisterTenant {
        RegisterTenant {
            name: name.to_string(),
            ..RegisterTenant::default()
        }
    }

    #[test]
    fn registration_seeds_and_enables() {
        let dir = directory();
        let tenant = dir.register(&signup("Café Crème"), Utc::now()).unwrap();

        assert_eq!(tenant.code, "cafe-creme");
        assert!(tenant.active);
        assert_eq!(dir.dictionaries.list(tenant.id, DictionaryType::Currency, false).len(), 4);
        assert_eq!(dir.modules.enabled_modules(tenant.id).len(), CoreModule::ALL.len());
        assert_eq!(dir.active_by_code("CAFE-CREME"), Some(tenant.id));
    }

    #[test]
    fn codes_are_made_unique() {
        let dir = directory();
        let a = dir.register(&signup("Acme"), Utc::now()).unwrap();
        let b = dir.register(&signup("acme"), Utc::now()).unwrap();
        let c = dir.register(&signup("ACME"), Utc::now()).unwrap();
        assert_eq!((a.code.as_str(), b.code.as_str(), c.code.as_str()), ("acme", "acme-1", "acme-2"));
    }

    #[test]
    fn inactive_tenants_do_not_resolve() {
        let dir = directory();
        let first = dir.register(&signup("First"), Utc::now()).unwrap();
        let second = dir.register(&signup("Second"), Utc::now()).unwrap();
        assert_eq!(TenantLookup::first_active(&dir), Some(first.id));

        dir.set_active(first.id, false, Utc::now()).unwrap();
        assert!(!dir.is_active(first.id));
        assert_eq!(dir.active_by_code("first"), None);
        assert_eq!(TenantLookup::first_active(&dir), Some(second.id));
    }
}
