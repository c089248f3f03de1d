use serde::de::DeserializeOwned;

use atelier_core::{Aggregate, AggregateId, TenantId};
use atelier_events::JsonEnvelope;

use super::cursor::{CursorCheck, StreamCursors};
use super::{EnvelopeProjection, ProjectionError, check_payload_tenant};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Read model holding the folded state of every aggregate of one type.
///
/// Queries read the same state command handlers see, so a list or detail view
/// is a filter over rehydrated aggregates.
pub struct AggregateProjection<A> {
    name: &'static str,
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    store: InMemoryTenantStore<AggregateId, A>,
    cursors: StreamCursors,
}

impl<A> AggregateProjection<A>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned,
{
    pub fn new(name: &'static str, aggregate_type: &'static str, make: fn(AggregateId) -> A) -> Self {
        Self {
            name,
            aggregate_type,
            make,
            store: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    pub fn filter(&self, tenant_id: TenantId, predicate: impl Fn(&A) -> bool) -> Vec<A> {
        self.list(tenant_id).into_iter().filter(|a| predicate(a)).collect()
    }

    pub fn find(&self, tenant_id: TenantId, predicate: impl Fn(&A) -> bool) -> Option<A> {
        self.list(tenant_id).into_iter().find(|a| predicate(a))
    }
}

impl<A> EnvelopeProjection for AggregateProjection<A>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned,
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

        let event: A::Event = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let mut state = self
            .store
            .get(tenant_id, &aggregate_id)
            .unwrap_or_else(|| (self.make)(aggregate_id));
        state.apply(&event);
        self.store.upsert(tenant_id, aggregate_id, state);

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use atelier_core::AggregateRoot;
    use atelier_core::UserId;
    use atelier_events::Event;
    use atelier_ticketing::{
        TICKET_AGGREGATE, Ticket, TicketEvent, TicketId, TicketOpened, TicketPriority, TicketStatus,
    };

    fn projection() -> AggregateProjection<Ticket> {
        AggregateProjection::new("ticketing.tickets", TICKET_AGGREGATE, |id| Ticket::empty(TicketId::new(id)))
    }

    fn opened(tenant_id: TenantId, id: AggregateId, seq: u64) -> JsonEnvelope {
        let event = TicketEvent::Opened(TicketOpened {
            tenant_id,
            ticket_id: TicketId::new(id),
            reference: "TCK-00001".to_string(),
            subject: "Broken keyboard".to_string(),
            description: None,
            priority: TicketPriority::Low,
            requester: UserId::new(),
            third_party_id: None,
            occurred_at: Utc::now(),
        });
        JsonEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            id,
            TICKET_AGGREGATE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
        .with_event_type(event.event_type())
    }

    #[test]
    fn folds_events_and_ignores_replays() {
        let p = projection();
        let (t, id) = (TenantId::new(), AggregateId::new());

        p.apply_envelope(&opened(t, id, 1)).unwrap();
        p.apply_envelope(&opened(t, id, 1)).unwrap();

        let ticket = p.get(t, id).unwrap();
        assert_eq!(ticket.version(), 1);
        assert_eq!(ticket.status(), TicketStatus::Open);
        assert!(p.get(TenantId::new(), id).is_none());
    }

    #[test]
    fn foreign_tenant_payload_is_rejected() {
        let p = projection();
        let id = AggregateId::new();
        let mut env = opened(TenantId::new(), id, 1);
        env = JsonEnvelope::new(env.event_id(), TenantId::new(), id, TICKET_AGGREGATE, 1, env.payload().clone());

        assert!(matches!(p.apply_envelope(&env), Err(ProjectionError::TenantIsolation(_))));
    }

    #[test]
    fn other_aggregate_types_pass_through() {
        let p = projection();
        let env = JsonEnvelope::new(Uuid::now_v7(), TenantId::new(), AggregateId::new(), "bank.account", 7, json!({}));
        p.apply_envelope(&env).unwrap();
    }

    #[test]
    fn rebuild_replays_in_stream_order() {
        let p = projection();
        let (t, id) = (TenantId::new(), AggregateId::new());
        p.apply_envelope(&opened(t, id, 1)).unwrap();

        p.rebuild_from_scratch(vec![opened(t, id, 1)]).unwrap();
        assert_eq!(p.list(t).len(), 1);
        assert_eq!(p.get(t, id).unwrap().version(), 1);
    }
}
