//! Read models built from published envelopes.
//!
//! Every projection is rebuildable from the event log, partitioned by tenant and
//! idempotent under at-least-once delivery thanks to [`StreamCursors`].

pub mod aggregate;
pub mod cursor;
pub mod read_models;
pub mod records;

use serde_json::Value as JsonValue;
use thiserror::Error;

use atelier_core::TenantId;
use atelier_events::JsonEnvelope;

pub use aggregate::AggregateProjection;
pub use cursor::{CursorCheck, StreamCursors};
pub use read_models::{AccountMovement, ReadModels};
pub use records::RecordProjection;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

pub trait EnvelopeProjection: Send + Sync {
    fn name(&self) -> &str;

    /// Envelopes of any other aggregate type are ignored.
    fn aggregate_type(&self) -> &str;

    fn apply_envelope(&self, envelope: &JsonEnvelope) -> Result<(), ProjectionError>;

    /// Drop the tenant's rows and cursors.
    fn clear_tenant(&self, tenant_id: TenantId);

    /// Clear every tenant present in `envelopes`, then replay them in
    /// `(tenant, aggregate, sequence)` order.
    fn rebuild_from_scratch(&self, envelopes: Vec<JsonEnvelope>) -> Result<(), ProjectionError> {
        let mut envelopes: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.aggregate_type() == self.aggregate_type())
            .collect();

        let mut tenants: Vec<TenantId> = envelopes.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for t in tenants {
            self.clear_tenant(t);
        }

        envelopes.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });
        for env in &envelopes {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

/// Stored events are externally tagged; every variant body carries `tenant_id`.
pub(crate) fn check_payload_tenant(envelope: &JsonEnvelope) -> Result<(), ProjectionError> {
    let body = match envelope.payload().as_object() {
        Some(map) if map.len() == 1 => map.values().next(),
        _ => None,
    };
    let found = body
        .and_then(|b| b.get("tenant_id"))
        .and_then(JsonValue::as_str)
        .and_then(|s| s.parse::<TenantId>().ok());
    match found {
        Some(t) if t == envelope.tenant_id() => Ok(()),
        Some(_) => Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        )),
        None => Err(ProjectionError::Deserialize("event payload carries no tenant_id".to_string())),
    }
}
