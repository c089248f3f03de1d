use atelier_core::TenantId;
use atelier_tenancy::{CoreModule, CurrentTenant, ModuleSetting, nocode_module_key};

use super::{RecordBackend, RecordResult, Records};

/// Which modules a tenant has switched on.
#[derive(Clone)]
pub struct ModuleSettings {
    store: Records<ModuleSetting>,
}

impl ModuleSettings {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            store: backend.store("module_settings"),
        }
    }

    /// A core module without a stored row counts as enabled.
    pub fn is_enabled(&self, tenant_id: TenantId, module: CoreModule) -> bool {
        self.store
            .get(tenant_id, &module.code().to_string())
            .is_none_or(|s| s.enabled)
    }

    pub fn set_enabled(&self, tenant_id: TenantId, module: CoreModule, enabled: bool) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        self.store.upsert(
            tenant_id,
            module.code().to_string(),
            ModuleSetting::core(tenant_id, module, enabled),
        )?;
        Ok(())
    }

    pub fn enable_all(&self, tenant_id: TenantId) -> RecordResult<()> {
        for module in CoreModule::ALL {
            self.set_enabled(tenant_id, module, true)?;
        }
        Ok(())
    }

    /// Enabled core modules in menu order.
    pub fn enabled_modules(&self, tenant_id: TenantId) -> Vec<CoreModule> {
        let mut modules: Vec<CoreModule> = CoreModule::ALL
            .into_iter()
            .filter(|m| self.is_enabled(tenant_id, *m))
            .collect();
        modules.sort_by_key(|m| m.sort_order());
        modules
    }

    /// Idempotent.
    pub fn activate_nocode(&self, tenant_id: TenantId, module_code: &str) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        self.store.upsert(
            tenant_id,
            nocode_module_key(module_code),
            ModuleSetting::nocode(tenant_id, module_code),
        )?;
        Ok(())
    }

    /// No-code modules need an explicit activation row.
    pub fn is_nocode_active(&self, tenant_id: TenantId, module_code: &str) -> bool {
        self.store
            .get(tenant_id, &nocode_module_key(module_code))
            .is_some_and(|s| s.enabled)
    }
}
