use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use atelier_core::{DomainError, TenantId};
use atelier_nocode::{CustomEntityDefinition, CustomRecord, EntityDraft, ModuleDefinition, ModuleDraft, NocodeError};
use atelier_tenancy::CurrentTenant;

use super::{ModuleSettings, RecordBackend, RecordError, Records, platform};

fn entity_key(module_code: &str, entity_code: &str) -> String {
    format!("{}/{}", module_code.trim().to_uppercase(), entity_code.trim().to_uppercase())
}

fn context_error(_: atelier_tenancy::TenantContextError) -> NocodeError {
    NocodeError::TenantMismatch
}

fn record_error(err: RecordError) -> NocodeError {
    match err {
        RecordError::Domain(e) => NocodeError::Domain(e),
        RecordError::Tenant(e) => context_error(e),
        RecordError::Store(msg) => NocodeError::Storage(msg),
    }
}

/// Published modules, their entity definitions and tenants' custom records.
///
/// Definitions are shared across tenants (platform partition). Records carry
/// their owner and are checked against the caller on every access.
#[derive(Clone)]
pub struct NocodeRegistry {
    modules: Records<ModuleDefinition>,
    entities: Records<CustomEntityDefinition>,
    records: Records<CustomRecord>,
    settings: ModuleSettings,
}

impl NocodeRegistry {
    pub fn new(backend: &RecordBackend, settings: ModuleSettings) -> Self {
        Self {
            modules: backend.store("nocode_modules"),
            entities: backend.store("nocode_entities"),
            records: backend.store("nocode_records"),
            settings,
        }
    }

    pub fn publish_module(
        &self,
        tenant_id: TenantId,
        draft: ModuleDraft,
        now: DateTime<Utc>,
    ) -> Result<ModuleDefinition, NocodeError> {
        CurrentTenant::ensure(tenant_id).map_err(context_error)?;
        let module = draft.into_definition(Uuid::now_v7(), tenant_id, now)?;
        if self.modules.get(platform(), &module.code).is_some() {
            return Err(DomainError::conflict(format!("module {} already exists", module.code)).into());
        }
        self.modules
            .upsert(platform(), module.code.clone(), module.clone())
            .map_err(record_error)?;
        info!(tenant_id = %tenant_id, module = %module.code, "no-code module published");
        Ok(module)
    }

    pub fn module(&self, code: &str) -> Option<ModuleDefinition> {
        self.modules.get(platform(), &code.trim().to_uppercase())
    }

    /// Sorted by name.
    pub fn list_public_modules(&self) -> Vec<ModuleDefinition> {
        let mut modules: Vec<_> = self
            .modules
            .list(platform())
            .into_iter()
            .filter(|m| m.is_public)
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
        modules
    }

    /// Public modules, or the tenant's own. Idempotent.
    pub fn activate_for_tenant(&self, tenant_id: TenantId, module_code: &str) -> Result<(), NocodeError> {
        let module = self
            .module(module_code)
            .ok_or_else(|| NocodeError::ModuleNotFound(module_code.to_string()))?;
        if !module.is_public && module.author_tenant_id != tenant_id {
            return Err(NocodeError::ModuleNotFound(module_code.to_string()));
        }
        self.settings
            .activate_nocode(tenant_id, &module.code)
            .map_err(record_error)
    }

    /// Only the module's author may add entities to it.
    pub fn define_entity(
        &self,
        tenant_id: TenantId,
        module_code: &str,
        draft: EntityDraft,
    ) -> Result<CustomEntityDefinition, NocodeError> {
        CurrentTenant::ensure(tenant_id).map_err(context_error)?;
        let module = self
            .module(module_code)
            .ok_or_else(|| NocodeError::ModuleNotFound(module_code.to_string()))?;
        if module.author_tenant_id != tenant_id {
            return Err(NocodeError::TenantMismatch);
        }
        let definition = draft.into_definition(Uuid::now_v7(), &module.code)?;
        let key = entity_key(&module.code, &definition.code);
        if self.entities.get(platform(), &key).is_some() {
            return Err(DomainError::conflict(format!(
                "entity {} already exists in {}",
                definition.code, module.code
            ))
            .into());
        }
        self.entities
            .upsert(platform(), key, definition.clone())
            .map_err(record_error)?;
        Ok(definition)
    }

    pub fn find_definition(&self, module_code: &str, entity_code: &str) -> Result<CustomEntityDefinition, NocodeError> {
        self.entities
            .get(platform(), &entity_key(module_code, entity_code))
            .ok_or_else(|| NocodeError::EntityNotFound {
                module: module_code.to_string(),
                entity: entity_code.to_string(),
            })
    }

    /// Definition of an entity the tenant may store records for.
    fn usable_definition(
        &self,
        tenant_id: TenantId,
        module_code: &str,
        entity_code: &str,
    ) -> Result<CustomEntityDefinition, NocodeError> {
        let module = self
            .module(module_code)
            .ok_or_else(|| NocodeError::ModuleNotFound(module_code.to_string()))?;
        if module.author_tenant_id != tenant_id && !self.settings.is_nocode_active(tenant_id, &module.code) {
            return Err(NocodeError::ModuleNotFound(module_code.to_string()));
        }
        self.find_definition(&module.code, entity_code)
    }

    fn owned_record(&self, tenant_id: TenantId, definition: &CustomEntityDefinition, id: Uuid) -> Result<CustomRecord, NocodeError> {
        let record = self
            .records
            .get(platform(), &id.to_string())
            .filter(|r| r.definition_id == definition.id)
            .ok_or(NocodeError::RecordNotFound)?;
        record.ensure_owned_by(tenant_id)?;
        Ok(record)
    }

    pub fn create_record(
        &self,
        tenant_id: TenantId,
        module_code: &str,
        entity_code: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<CustomRecord, NocodeError> {
        CurrentTenant::ensure(tenant_id).map_err(context_error)?;
        let definition = self.usable_definition(tenant_id, module_code, entity_code)?;
        let record = CustomRecord::create(Uuid::now_v7(), tenant_id, &definition, payload, now)?;
        self.records
            .upsert(platform(), record.id.to_string(), record.clone())
            .map_err(record_error)?;
        Ok(record)
    }

    pub fn update_record(
        &self,
        tenant_id: TenantId,
        module_code: &str,
        entity_code: &str,
        id: Uuid,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<CustomRecord, NocodeError> {
        CurrentTenant::ensure(tenant_id).map_err(context_error)?;
        let definition = self.usable_definition(tenant_id, module_code, entity_code)?;
        let mut record = self.owned_record(tenant_id, &definition, id)?;
        record.replace_payload(tenant_id, &definition, payload, now)?;
        self.records
            .upsert(platform(), id.to_string(), record.clone())
            .map_err(record_error)?;
        Ok(record)
    }

    pub fn delete_record(&self, tenant_id: TenantId, module_code: &str, entity_code: &str, id: Uuid) -> Result<(), NocodeError> {
        CurrentTenant::ensure(tenant_id).map_err(context_error)?;
        let definition = self.usable_definition(tenant_id, module_code, entity_code)?;
        self.owned_record(tenant_id, &definition, id)?;
        self.records.remove(platform(), &id.to_string()).map_err(record_error)?;
        Ok(())
    }

    pub fn get_record(&self, tenant_id: TenantId, module_code: &str, entity_code: &str, id: Uuid) -> Result<CustomRecord, NocodeError> {
        let definition = self.usable_definition(tenant_id, module_code, entity_code)?;
        self.owned_record(tenant_id, &definition, id)
    }

    /// Newest first.
    pub fn list_records(&self, tenant_id: TenantId, module_code: &str, entity_code: &str) -> Result<Vec<CustomRecord>, NocodeError> {
        let definition = self.usable_definition(tenant_id, module_code, entity_code)?;
        let mut records: Vec<_> = self
            .records
            .list(platform())
            .into_iter()
            .filter(|r| r.tenant_id == tenant_id && r.definition_id == definition.id)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_nocode::{FieldDef, FieldType};
    use serde_json::json;

    fn registry() -> NocodeRegistry {
        let backend = RecordBackend::Memory;
        NocodeRegistry::new(&backend, ModuleSettings::new(&backend))
    }

    fn fleet(registry: &NocodeRegistry, author: TenantId) {
        CurrentTenant::sync_scope(author, || {
            registry
                .publish_module(
                    author,
                    ModuleDraft {
                        code: "fleet".to_string(),
                        name: "Fleet".to_string(),
                        is_public: true,
                        ..ModuleDraft::default()
                    },
                    Utc::now(),
                )
                .unwrap();
            registry
                .define_entity(
                    author,
                    "fleet",
                    EntityDraft {
                        code: "vehicle".to_string(),
                        name: "Vehicle".to_string(),
                        fields: vec![FieldDef {
                            name: "plate".to_string(),
                            label: None,
                            field_type: FieldType::Text,
                            required: true,
                            options: vec![],
                        }],
                        ..EntityDraft::default()
                    },
                )
                .unwrap();
        });
    }

    #[test]
    fn other_tenants_must_activate_before_use() {
        let reg = registry();
        let (author, other) = (TenantId::new(), TenantId::new());
        fleet(&reg, author);

        CurrentTenant::sync_scope(other, || {
            let err = reg
                .create_record(other, "fleet", "vehicle", json!({"plate": "AB-123"}), Utc::now())
                .unwrap_err();
            assert!(matches!(err, NocodeError::ModuleNotFound(_)));

            reg.activate_for_tenant(other, "FLEET").unwrap();
            reg.activate_for_tenant(other, "fleet").unwrap();
            reg.create_record(other, "fleet", "vehicle", json!({"plate": "AB-123"}), Utc::now())
                .unwrap();
        });
        assert_eq!(reg.list_records(other, "fleet", "vehicle").unwrap().len(), 1);
        assert!(reg.list_records(author, "fleet", "vehicle").unwrap().is_empty());
    }

    #[test]
    fn records_of_another_tenant_are_off_limits() {
        let reg = registry();
        let (author, other) = (TenantId::new(), TenantId::new());
        fleet(&reg, author);
        let record = CurrentTenant::sync_scope(author, || {
            reg.create_record(author, "fleet", "vehicle", json!({"plate": "X"}), Utc::now())
                .unwrap()
        });

        CurrentTenant::sync_scope(other, || {
            reg.activate_for_tenant(other, "fleet").unwrap();
            let err = reg
                .update_record(other, "fleet", "vehicle", record.id, json!({"plate": "Y"}), Utc::now())
                .unwrap_err();
            assert_eq!(err, NocodeError::TenantMismatch);
        });
        assert_eq!(
            reg.get_record(other, "fleet", "vehicle", record.id).unwrap_err(),
            NocodeError::TenantMismatch
        );
    }

    #[test]
    fn only_the_author_defines_entities() {
        let reg = registry();
        let (author, other) = (TenantId::new(), TenantId::new());
        fleet(&reg, author);

        let err = CurrentTenant::sync_scope(other, || {
            reg.define_entity(
                other,
                "fleet",
                EntityDraft {
                    code: "driver".to_string(),
                    name: "Driver".to_string(),
                    ..EntityDraft::default()
                },
            )
            .unwrap_err()
        });
        assert_eq!(err, NocodeError::TenantMismatch);
        assert_eq!(reg.list_public_modules().len(), 1);
    }
}
