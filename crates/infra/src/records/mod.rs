//! Tenant-scoped reference records: tenants, dictionaries, module settings,
//! automation rules, no-code definitions, HR reference data and import runs.
//!
//! Writes go through `Stamped`/`CurrentTenant` so a record is only ever created
//! or changed from inside its tenant's context.

pub mod dictionaries;
pub mod hr;
pub mod imports;
pub mod modules;
pub mod nocode;
pub mod outbox;
pub mod postgres;
pub mod rules;
pub mod tenants;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use thiserror::Error;

use atelier_core::{DomainError, TenantId};
use atelier_tenancy::TenantContextError;

use crate::read_model::{InMemoryTenantStore, TenantStore};

pub use dictionaries::Dictionaries;
pub use hr::{HrReference, LeaveValidator};
pub use imports::TenantRunStore;
pub use modules::ModuleSettings;
pub use nocode::NocodeRegistry;
pub use outbox::StoredOutbox;
pub use postgres::{PostgresRecordStore, RECORDS_SCHEMA, migrate_records};
pub use rules::RuleRepository;
pub use tenants::TenantDirectory;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Tenant(#[from] TenantContextError),

    /// The write did not reach storage.
    #[error("record store failed: {0}")]
    Store(String),
}

pub type RecordResult<T> = Result<T, RecordError>;

/// Tenant-partitioned storage for records that no event stream can rebuild.
/// Writes report failure instead of dropping the row.
pub trait RecordStore<V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &str) -> Option<V>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    fn upsert(&self, tenant_id: TenantId, key: String, value: V) -> RecordResult<()>;
    /// Returns whether a value was present.
    fn remove(&self, tenant_id: TenantId, key: &str) -> RecordResult<bool>;
}

impl<V> RecordStore<V> for InMemoryTenantStore<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &str) -> Option<V> {
        TenantStore::get(self, tenant_id, &key.to_string())
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        TenantStore::list(self, tenant_id)
    }

    fn upsert(&self, tenant_id: TenantId, key: String, value: V) -> RecordResult<()> {
        TenantStore::upsert(self, tenant_id, key, value);
        Ok(())
    }

    fn remove(&self, tenant_id: TenantId, key: &str) -> RecordResult<bool> {
        Ok(TenantStore::remove(self, tenant_id, &key.to_string()))
    }
}

pub type Records<V> = Arc<dyn RecordStore<V>>;

/// Partition for records that belong to the platform rather than one tenant:
/// the tenant directory itself and published no-code definitions.
pub fn platform() -> TenantId {
    TenantId::nil()
}

/// Where record stores keep their data.
#[derive(Debug, Clone)]
pub enum RecordBackend {
    Memory,
    Postgres(PgPool),
}

impl RecordBackend {
    pub fn store<V>(&self, namespace: &'static str) -> Records<V>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match self {
            RecordBackend::Memory => Arc::new(InMemoryTenantStore::<String, V>::new()),
            RecordBackend::Postgres(pool) => Arc::new(PostgresRecordStore::<V>::new(pool.clone(), namespace)),
        }
    }
}

/// Store whose writes always fail, for checking that services surface it.
#[cfg(test)]
pub(crate) struct Unwritable;

#[cfg(test)]
impl<V> RecordStore<V> for Unwritable {
    fn get(&self, _tenant_id: TenantId, _key: &str) -> Option<V> {
        None
    }

    fn list(&self, _tenant_id: TenantId) -> Vec<V> {
        Vec::new()
    }

    fn upsert(&self, _tenant_id: TenantId, _key: String, _value: V) -> RecordResult<()> {
        Err(RecordError::Store("connection refused".to_string()))
    }

    fn remove(&self, _tenant_id: TenantId, _key: &str) -> RecordResult<bool> {
        Err(RecordError::Store("connection refused".to_string()))
    }
}
