use chrono::{DateTime, Utc};
use tracing::debug;

use atelier_core::{DomainError, TenantId};
use atelier_tenancy::{CurrentTenant, DictionaryItem, DictionaryType, NewDictionaryItem, Stamped, sort_items};

use super::{RecordBackend, RecordResult, Records};

fn key(dictionary_type: DictionaryType, code: &str) -> String {
    format!("{}:{}", dictionary_type.code(), code.trim().to_uppercase())
}

/// Per-tenant value lists (civilities, countries, currencies, ...).
#[derive(Clone)]
pub struct Dictionaries {
    store: Records<Stamped<DictionaryItem>>,
}

impl Dictionaries {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            store: backend.store("dictionaries"),
        }
    }

    pub fn get(&self, tenant_id: TenantId, dictionary_type: DictionaryType, code: &str) -> Option<DictionaryItem> {
        self.store
            .get(tenant_id, &key(dictionary_type, code))
            .map(|s| s.record)
    }

    pub fn create(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        input: &NewDictionaryItem,
        now: DateTime<Utc>,
    ) -> RecordResult<DictionaryItem> {
        CurrentTenant::ensure(tenant_id)?;
        let item = DictionaryItem::new(dictionary_type, input)?;
        let k = key(dictionary_type, &item.code);
        if self.store.get(tenant_id, &k).is_some() {
            return Err(DomainError::conflict(format!(
                "{} {} already exists",
                dictionary_type.code(),
                item.code
            ))
            .into());
        }
        self.store.upsert(tenant_id, k, Stamped::on_create(item.clone(), now)?)?;
        Ok(item)
    }

    pub fn update(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        code: &str,
        input: &NewDictionaryItem,
        now: DateTime<Utc>,
    ) -> RecordResult<DictionaryItem> {
        CurrentTenant::ensure(tenant_id)?;
        let k = key(dictionary_type, code);
        let mut stamped = self.store.get(tenant_id, &k).ok_or(DomainError::NotFound)?;
        let item = stamped.record.updated(input)?;
        stamped.on_update(item.clone(), now)?;
        self.store.upsert(tenant_id, k, stamped)?;
        Ok(item)
    }

    /// Upsert used by imports: an existing code takes the new label and order.
    pub fn create_or_update(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        input: &NewDictionaryItem,
        now: DateTime<Utc>,
    ) -> RecordResult<DictionaryItem> {
        if self.get(tenant_id, dictionary_type, &input.code).is_some() {
            self.update(tenant_id, dictionary_type, &input.code, input, now)
        } else {
            self.create(tenant_id, dictionary_type, input, now)
        }
    }

    /// Ordered by sort order, then code.
    pub fn list(&self, tenant_id: TenantId, dictionary_type: DictionaryType, include_inactive: bool) -> Vec<DictionaryItem> {
        let mut items: Vec<DictionaryItem> = self
            .store
            .list(tenant_id)
            .into_iter()
            .map(|s| s.record)
            .filter(|i| i.dictionary_type == dictionary_type && (include_inactive || i.active))
            .collect();
        sort_items(&mut items);
        items
    }

    pub fn delete(&self, tenant_id: TenantId, dictionary_type: DictionaryType, code: &str) -> RecordResult<()> {
        CurrentTenant::ensure(tenant_id)?;
        if self.store.remove(tenant_id, &key(dictionary_type, code))? {
            Ok(())
        } else {
            Err(DomainError::NotFound.into())
        }
    }

    /// Seed every dictionary type that has no entries yet. Returns how many
    /// entries were written.
    pub fn seed_defaults(&self, tenant_id: TenantId, now: DateTime<Utc>) -> RecordResult<usize> {
        CurrentTenant::ensure(tenant_id)?;
        let mut written = 0;
        for dictionary_type in DictionaryType::ALL {
            if !self.list(tenant_id, dictionary_type, true).is_empty() {
                continue;
            }
            for item in DictionaryItem::seeds(dictionary_type) {
                let k = key(dictionary_type, &item.code);
                self.store.upsert(tenant_id, k, Stamped::on_create(item, now)?)?;
                written += 1;
            }
            debug!(tenant_id = %tenant_id, dictionary = dictionary_type.code(), "dictionary seeded");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordError;

    fn input(code: &str, label: &str) -> NewDictionaryItem {
        NewDictionaryItem {
            code: code.to_string(),
            label: label.to_string(),
            sort_order: None,
            active: None,
        }
    }

    #[test]
    fn writes_need_the_tenant_context() {
        let dicts = Dictionaries::new(&RecordBackend::Memory);
        let t = TenantId::new();
        let err = dicts.create(t, DictionaryType::Country, &input("fr", "France"), Utc::now()).unwrap_err();
        assert!(matches!(err, RecordError::Tenant(_)));
    }

    #[test]
    fn duplicate_codes_conflict() {
        let dicts = Dictionaries::new(&RecordBackend::Memory);
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            let item = dicts.create(t, DictionaryType::Country, &input(" fr ", "France"), Utc::now()).unwrap();
            assert_eq!(item.code, "FR");
            let err = dicts.create(t, DictionaryType::Country, &input("FR", "Again"), Utc::now()).unwrap_err();
            assert!(matches!(err, RecordError::Domain(DomainError::Conflict(_))));

            let updated = dicts
                .create_or_update(t, DictionaryType::Country, &input("fr", "République française"), Utc::now())
                .unwrap();
            assert_eq!(updated.label, "République française");
        });
    }

    #[test]
    fn seeding_skips_types_that_have_entries() {
        let dicts = Dictionaries::new(&RecordBackend::Memory);
        let t = TenantId::new();
        CurrentTenant::sync_scope(t, || {
            dicts.create(t, DictionaryType::Civility, &input("DR", "Doctor"), Utc::now()).unwrap();
            dicts.seed_defaults(t, Utc::now()).unwrap();

            let civilities = dicts.list(t, DictionaryType::Civility, true);
            assert_eq!(civilities.len(), 1);
            let countries: Vec<_> = dicts
                .list(t, DictionaryType::Country, false)
                .into_iter()
                .map(|i| i.code)
                .collect();
            assert_eq!(countries, ["FR", "BE", "CH", "DE", "ES", "GB", "US"]);

            dicts.delete(t, DictionaryType::Country, "us").unwrap();
            assert!(dicts.delete(t, DictionaryType::Country, "us").is_err());
        });
    }
}
