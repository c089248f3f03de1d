//! Per-stream cursors: the last sequence number a projection applied for each
//! `(tenant, aggregate)` stream.

use std::collections::HashMap;
use std::sync::RwLock;

use atelier_core::{AggregateId, TenantId};

use super::ProjectionError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    Apply,
    /// Already applied; at-least-once delivery replays are expected.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&CursorKey { tenant_id, aggregate_id }).copied())
            .unwrap_or(0)
    }

    /// Only `last + 1` may be applied.
    pub fn check(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorCheck, ProjectionError> {
        let last = self.last(tenant_id, aggregate_id);
        if sequence_number != 0 && sequence_number <= last {
            return Ok(CursorCheck::Duplicate);
        }
        if sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(CursorKey { tenant_id, aggregate_id }, sequence_number);
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut m) = self.inner.write() {
            m.retain(|k, _| k.tenant_id != tenant_id);
        }
    }
}
