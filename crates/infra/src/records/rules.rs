use chrono::{DateTime, Utc};
use uuid::Uuid;

use atelier_automation::{AutomationRule, RuleDraft, RuleSource};
use atelier_core::{DomainError, TenantId};
use atelier_tenancy::{CurrentTenant, Stamped};

use super::{RecordBackend, RecordResult, Records};

#[derive(Clone)]
pub struct RuleRepository {
    store: Records<Stamped<AutomationRule>>,
}

impl RuleRepository {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            store: backend.store("automation_rules"),
        }
    }

    pub fn create(&self, tenant_id: TenantId, draft: RuleDraft, now: DateTime<Utc>) -> RecordResult<AutomationRule> {
        CurrentTenant::ensure(tenant_id)?;
        let rule = draft.into_rule(Uuid::now_v7())?;
        self.store
            .upsert(tenant_id, rule.id.to_string(), Stamped::on_create(rule.clone(), now)?)?;
        Ok(rule)
    }

    pub fn update(
        &self,
        tenant_id: TenantId,
        id: Uuid,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> RecordResult<AutomationRule> {
        CurrentTenant::ensure(tenant_id)?;
        let mut stamped = self.store.get(tenant_id, &id.to_string()).ok_or(DomainError::NotFound)?;
        let rule = draft.into_rule(id)?;
        stamped.on_update(rule.clone(), now)?;
        self.store.upsert(tenant_id, id.to_string(), stamped)?;
        Ok(rule)
    }

    pub fn delete(&self, tenant_id: TenantId, id: Uuid) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        if self.store.remove(tenant_id, &id.to_string())? {
            Ok(())
        } else {
            Err(DomainError::NotFound.into())
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: Uuid) -> Option<AutomationRule> {
        self.store.get(tenant_id, &id.to_string()).map(|s| s.record)
    }

    /// Sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<AutomationRule> {
        let mut rules: Vec<_> = self.store.list(tenant_id).into_iter().map(|s| s.record).collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rules
    }
}

impl RuleSource for RuleRepository {
    fn find_enabled(&self, tenant_id: TenantId, entity: &str, event: &str) -> Vec<AutomationRule> {
        self.list(tenant_id)
            .into_iter()
            .filter(|r| r.enabled && r.trigger_entity == entity && r.trigger_event == event)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordError;

    fn draft(name: &str, enabled: bool) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            trigger_entity: "invoice".to_string(),
            trigger_event: "validated".to_string(),
            action_type: "log".to_string(),
            enabled,
            ..RuleDraft::default()
        }
    }

    #[test]
    fn only_enabled_rules_for_the_trigger_are_found() {
        let repo = RuleRepository::new(&RecordBackend::Memory);
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            repo.create(t, draft("b", true), Utc::now()).unwrap();
            repo.create(t, draft("a", false), Utc::now()).unwrap();
        });

        let found = repo.find_enabled(t, "INVOICE", "VALIDATED");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "b");
        assert!(repo.find_enabled(t, "INVOICE", "PAID").is_empty());
        assert!(repo.find_enabled(TenantId::new(), "INVOICE", "VALIDATED").is_empty());
    }

    #[test]
    fn updates_keep_the_id() {
        let repo = RuleRepository::new(&RecordBackend::Memory);
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            let rule = repo.create(t, draft("first", true), Utc::now()).unwrap();
            let updated = repo.update(t, rule.id, draft("renamed", false), Utc::now()).unwrap();
            assert_eq!(updated.id, rule.id);
            assert_eq!(repo.list(t)[0].name, "renamed");

            repo.delete(t, rule.id).unwrap();
            assert!(repo.get(t, rule.id).is_none());
        });
    }

    #[test]
    fn failed_writes_are_reported() {
        let repo = RuleRepository {
            store: std::sync::Arc::new(crate::records::Unwritable),
        };
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            let err = repo.create(t, draft("lost", true), Utc::now()).unwrap_err();
            assert!(matches!(err, RecordError::Store(_)));
            let err = repo.delete(t, Uuid::now_v7()).unwrap_err();
            assert!(matches!(err, RecordError::Store(_)));
        });
    }
}
