//! Import run bookkeeping: runs, logs, id mappings and staged payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use atelier_core::{AggregateId, TenantId, UserId};

use crate::sink::ImportError;

pub const MAX_LOG_MESSAGE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    pub imported: u32,
    pub skipped: u32,
    pub errors: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub config_id: Option<Uuid>,
    pub base_url: String,
    pub started_by: Option<UserId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub steps: BTreeMap<String, StepCounters>,
}

impl ImportRun {
    pub fn start(
        tenant_id: TenantId,
        config: &ImportConfig,
        started_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            config_id: Some(config.id),
            base_url: config.base_url.clone(),
            started_by,
            started_at: now,
            finished_at: None,
            status: RunStatus::Running,
            steps: BTreeMap::new(),
        }
    }

    pub fn counters_mut(&mut self, step: &str) -> &mut StepCounters {
        self.steps.entry(step.to_string()).or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLog {
    pub run_id: Uuid,
    pub step: String,
    pub level: LogLevel,
    pub external_id: Option<String>,
    pub entity_type: Option<String>,
    pub local_id: Option<AggregateId>,
    pub message: String,
    pub detail: Option<Value>,
    pub logged_at: DateTime<Utc>,
}

impl ImportLog {
    pub fn new(run_id: Uuid, step: &str, level: LogLevel, message: &str) -> Self {
        Self {
            run_id,
            step: step.to_string(),
            level,
            external_id: None,
            entity_type: None,
            local_id: None,
            message: truncate(message, MAX_LOG_MESSAGE),
            detail: None,
            logged_at: Utc::now(),
        }
    }

    pub fn external(mut self, external_id: impl ToString) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMapping {
    pub run_id: Uuid,
    pub dolibarr_entity: String,
    pub dolibarr_id: i64,
    pub local_entity: String,
    pub local_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub resource: String,
    pub external_id: i64,
    pub payload: Value,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub id: Uuid,
    pub base_url: String,
    pub api_key: String,
}

impl core::fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImportConfig")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Tenant-scoped persistence for everything above. None of it can be rebuilt
/// from events, so every write reports failure.
pub trait RunStore: Send + Sync {
    fn save_run(&self, run: &ImportRun) -> Result<(), ImportError>;
    fn get_run(&self, tenant_id: TenantId, run_id: Uuid) -> Option<ImportRun>;
    /// Newest first.
    fn list_runs(&self, tenant_id: TenantId) -> Vec<ImportRun>;

    fn append_log(&self, tenant_id: TenantId, log: ImportLog) -> Result<(), ImportError>;
    /// In insertion order.
    fn logs(&self, tenant_id: TenantId, run_id: Uuid) -> Vec<ImportLog>;

    fn save_mapping(&self, tenant_id: TenantId, mapping: ImportMapping) -> Result<(), ImportError>;
    fn mappings(&self, tenant_id: TenantId) -> Vec<ImportMapping>;

    fn save_staging(&self, tenant_id: TenantId, record: StagingRecord) -> Result<(), ImportError>;
    fn staging(&self, tenant_id: TenantId, run_id: Uuid) -> Vec<StagingRecord>;

    fn save_config(&self, tenant_id: TenantId, config: ImportConfig) -> Result<(), ImportError>;
    fn config(&self, tenant_id: TenantId) -> Option<ImportConfig>;

    /// Local id for a Dolibarr row, preferring this run's mapping, then any earlier run.
    fn find_local_id(
        &self,
        tenant_id: TenantId,
        run_id: Uuid,
        dolibarr_entity: &str,
        dolibarr_id: i64,
    ) -> Option<AggregateId> {
        let candidates: Vec<ImportMapping> = self
            .mappings(tenant_id)
            .into_iter()
            .filter(|m| m.dolibarr_entity == dolibarr_entity && m.dolibarr_id == dolibarr_id)
            .collect();
        candidates
            .iter()
            .find(|m| m.run_id == run_id)
            .or_else(|| candidates.last())
            .map(|m| m.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_messages_are_truncated_on_char_boundaries() {
        let msg = "é".repeat(MAX_LOG_MESSAGE + 10);
        let log = ImportLog::new(Uuid::now_v7(), "X", LogLevel::Info, &msg);
        assert_eq!(log.message.chars().count(), MAX_LOG_MESSAGE);
    }

    #[test]
    fn api_key_never_shows_in_debug() {
        let cfg = ImportConfig {
            id: Uuid::now_v7(),
            base_url: "https://erp.example.com".to_string(),
            api_key: "s3cr3t".to_string(),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("s3cr3t"));
        assert!(dbg.contains("erp.example.com"));
    }
}
