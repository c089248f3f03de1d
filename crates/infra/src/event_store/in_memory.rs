use std::collections::HashMap;
use std::sync::RwLock;

use atelier_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, check_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store for tests and the `memory` storage mode.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
    /// Stream keys in creation order, so `load_all` is deterministic.
    order: RwLock<Vec<StreamKey>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Backend("lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, aggregate_id, aggregate_type) = check_batch(&events)?;
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut streams = self.streams.write().map_err(|_| Self::poisoned())?;
        let is_new = !streams.contains_key(&key);
        let stream = streams.entry(key).or_default();
        let current = stream.last().map(|e| e.sequence_number).unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + 1 + offset as u64,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            stream.push(stored.clone());
            committed.push(stored);
        }

        if is_new {
            self.order.write().map_err(|_| Self::poisoned())?.push(key);
        }
        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        let order = self.order.read().map_err(|_| Self::poisoned())?;
        Ok(order
            .iter()
            .filter_map(|k| streams.get(k))
            .flat_map(|s| s.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({"n": 1}),
        }
    }

    #[test]
    fn sequence_numbers_continue_the_stream() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let first = store
            .append(vec![event(t, a, "x"), event(t, a, "x")], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let next = store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(2)).unwrap();
        assert_eq!(next[0].sequence_number, 3);
        assert_eq!(store.load_stream(t, a).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn mixed_batches_and_type_changes_are_refused() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let mixed = vec![event(t, a, "x"), event(TenantId::new(), a, "x")];
        assert!(matches!(
            store.append(mixed, ExpectedVersion::Any),
            Err(EventStoreError::TenantIsolation(_))
        ));

        store.append(vec![event(t, a, "x")], ExpectedVersion::Any).unwrap();
        assert!(matches!(
            store.append(vec![event(t, a, "y")], ExpectedVersion::Any),
            Err(EventStoreError::AggregateTypeMismatch(_))
        ));
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let (t1, t2, a) = (TenantId::new(), TenantId::new(), AggregateId::new());
        store.append(vec![event(t1, a, "x")], ExpectedVersion::Any).unwrap();

        assert!(store.load_stream(t2, a).unwrap().is_empty());
        store.append(vec![event(t2, a, "x")], ExpectedVersion::Exact(0)).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }
}
