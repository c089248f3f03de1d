use serde::de::DeserializeOwned;

use atelier_core::{AggregateId, TenantId};
use atelier_events::JsonEnvelope;

use super::cursor::{CursorCheck, StreamCursors};
use super::{EnvelopeProjection, ProjectionError, check_payload_tenant};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Pulls one row out of an event, keyed by the row's own id.
pub type Extract<E, R> = fn(AggregateId, &E) -> Option<(AggregateId, R)>;

/// Read model of rows carried by events rather than by aggregate state:
/// journal entries of the ledger, movements of a bank account.
pub struct RecordProjection<E, R> {
    name: &'static str,
    aggregate_type: &'static str,
    extract: Extract<E, R>,
    store: InMemoryTenantStore<AggregateId, R>,
    cursors: StreamCursors,
}

impl<E, R> RecordProjection<E, R>
where
    E: DeserializeOwned + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, aggregate_type: &'static str, extract: Extract<E, R>) -> Self {
        Self {
            name,
            aggregate_type,
            extract,
            store: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<R> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<R> {
        self.store.list(tenant_id)
    }
}

impl<E, R> EnvelopeProjection for RecordProjection<E, R>
where
    E: DeserializeOwned + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn aggregate_type(&self) -> &str {
        self.aggregate_type
    }

    fn apply_envelope(&self, envelope: &JsonEnvelope) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if self.cursors.check(tenant_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }
        check_payload_tenant(envelope)?;

        let event: E = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        if let Some((key, row)) = (self.extract)(aggregate_id, &event) {
            self.store.upsert(tenant_id, key, row);
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
