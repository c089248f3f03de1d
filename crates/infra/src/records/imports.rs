use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::{AggregateId, TenantId};
use atelier_dolibarr::{ImportConfig, ImportError, ImportLog, ImportMapping, ImportRun, RunStore, StagingRecord};

use super::{RecordBackend, RecordError, Records};

/// Log line with its write order; `ImportLog` timestamps can tie.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRow {
    seq: u64,
    log: ImportLog,
}

fn mapping_key(dolibarr_entity: &str, dolibarr_id: i64, run_id: Uuid) -> String {
    format!("{dolibarr_entity}:{dolibarr_id}:{run_id}")
}

const CONFIG_KEY: &str = "dolibarr";

impl From<RecordError> for ImportError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Domain(e) => ImportError::Domain(e),
            RecordError::Tenant(e) => ImportError::Tenant(e),
            RecordError::Store(msg) => ImportError::Store(msg),
        }
    }
}

/// `RunStore` over tenant record stores.
#[derive(Clone)]
pub struct TenantRunStore {
    runs: Records<ImportRun>,
    logs: Records<LogRow>,
    mappings: Records<ImportMapping>,
    staging: Records<StagingRecord>,
    configs: Records<ImportConfig>,
    next_log: Arc<AtomicU64>,
}

impl TenantRunStore {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            runs: backend.store("import_runs"),
            logs: backend.store("import_logs"),
            mappings: backend.store("import_mappings"),
            staging: backend.store("import_staging"),
            configs: backend.store("import_configs"),
            next_log: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl RunStore for TenantRunStore {
    fn save_run(&self, run: &ImportRun) -> Result<(), ImportError> {
        Ok(self.runs.upsert(run.tenant_id, run.id.to_string(), run.clone())?)
    }

    fn get_run(&self, tenant_id: TenantId, run_id: Uuid) -> Option<ImportRun> {
        self.runs.get(tenant_id, &run_id.to_string())
    }

    fn list_runs(&self, tenant_id: TenantId) -> Vec<ImportRun> {
        let mut runs = self.runs.list(tenant_id);
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        runs
    }

    fn append_log(&self, tenant_id: TenantId, log: ImportLog) -> Result<(), ImportError> {
        let seq = self.next_log.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}:{seq:012}", log.run_id);
        Ok(self.logs.upsert(tenant_id, key, LogRow { seq, log })?)
    }

    fn logs(&self, tenant_id: TenantId, run_id: Uuid) -> Vec<ImportLog> {
        let mut rows: Vec<LogRow> = self
            .logs
            .list(tenant_id)
            .into_iter()
            .filter(|r| r.log.run_id == run_id)
            .collect();
        rows.sort_by_key(|r| r.seq);
        rows.into_iter().map(|r| r.log).collect()
    }

    fn save_mapping(&self, tenant_id: TenantId, mapping: ImportMapping) -> Result<(), ImportError> {
        let key = mapping_key(&mapping.dolibarr_entity, mapping.dolibarr_id, mapping.run_id);
        Ok(self.mappings.upsert(tenant_id, key, mapping)?)
    }

    fn mappings(&self, tenant_id: TenantId) -> Vec<ImportMapping> {
        self.mappings.list(tenant_id)
    }

    fn save_staging(&self, tenant_id: TenantId, record: StagingRecord) -> Result<(), ImportError> {
        Ok(self.staging.upsert(tenant_id, record.id.to_string(), record)?)
    }

    fn staging(&self, tenant_id: TenantId, run_id: Uuid) -> Vec<StagingRecord> {
        let mut records: Vec<_> = self
            .staging
            .list(tenant_id)
            .into_iter()
            .filter(|r| r.run_id == run_id)
            .collect();
        records.sort_by(|a, b| a.resource.cmp(&b.resource).then_with(|| a.external_id.cmp(&b.external_id)));
        records
    }

    fn save_config(&self, tenant_id: TenantId, config: ImportConfig) -> Result<(), ImportError> {
        Ok(self.configs.upsert(tenant_id, CONFIG_KEY.to_string(), config)?)
    }

    fn config(&self, tenant_id: TenantId) -> Option<ImportConfig> {
        self.configs.get(tenant_id, &CONFIG_KEY.to_string())
    }

    /// Direct key lookup for the current run; earlier runs need a scan.
    fn find_local_id(
        &self,
        tenant_id: TenantId,
        run_id: Uuid,
        dolibarr_entity: &str,
        dolibarr_id: i64,
    ) -> Option<AggregateId> {
        if let Some(m) = self.mappings.get(tenant_id, &mapping_key(dolibarr_entity, dolibarr_id, run_id)) {
            return Some(m.local_id);
        }
        self.mappings
            .list(tenant_id)
            .into_iter()
            .filter(|m| m.dolibarr_entity == dolibarr_entity && m.dolibarr_id == dolibarr_id)
            .max_by(|a, b| a.run_id.cmp(&b.run_id))
            .map(|m| m.local_id)
    }
}
