//! Committed events → rule triggers.

use serde_json::Value;

use atelier_core::AggregateId;
use atelier_events::JsonEnvelope;

use crate::rule::TriggerContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub entity: &'static str,
    pub event: &'static str,
    pub context: TriggerContext,
}

/// Entity/event pair fired by a dotted event type, with the status implied when
/// the payload does not carry one.
fn classify(event_type: &str, payload: &Value) -> Option<(&'static str, &'static str, Option<&'static str>)> {
    let fired = match event_type {
        "invoicing.invoice.created" => ("INVOICE", "CREATED", Some("DRAFT")),
        "invoicing.invoice.validated" => ("INVOICE", "VALIDATED", None),
        "invoicing.invoice.cancelled" => ("INVOICE", "CANCELLED", None),
        "invoicing.invoice.payment_registered" => {
            let paid = payload
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("paid"));
            if !paid {
                return None;
            }
            ("INVOICE", "PAID", None)
        }
        "sales.proposal.created" => ("PROPOSAL", "CREATED", Some("DRAFT")),
        "sales.proposal.sent" => ("PROPOSAL", "SENT", None),
        "sales.proposal.accepted" => ("PROPOSAL", "ACCEPTED", None),
        "sales.proposal.refused" => ("PROPOSAL", "REFUSED", None),
        "sales.order.created" => ("ORDER", "CREATED", None),
        "parties.third_party.registered" => ("THIRD_PARTY", "CREATED", None),
        "ticketing.ticket.opened" => ("TICKET", "CREATED", Some("OPEN")),
        _ => return None,
    };
    Some(fired)
}

/// Stored events are externally tagged (`{"Created": {...}}`); unwrap the variant.
fn variant_body(payload: &Value) -> &Value {
    match payload.as_object() {
        Some(map) if map.len() == 1 => map.values().next().unwrap_or(payload),
        _ => payload,
    }
}

fn id_field(body: &Value, key: &str) -> Option<AggregateId> {
    body.get(key)?.as_str()?.parse().ok()
}

fn amount(body: &Value) -> Option<i64> {
    body.get("total")
        .and_then(Value::as_i64)
        .or_else(|| body.get("totals")?.get("total")?.as_i64())
}

pub fn trigger_for(envelope: &JsonEnvelope) -> Option<Trigger> {
    let body = variant_body(envelope.payload());
    let (entity, event, implied_status) = classify(envelope.event_type(), body)?;

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_uppercase)
        .or_else(|| implied_status.map(str::to_string));

    Some(Trigger {
        entity,
        event,
        context: TriggerContext {
            status,
            amount: amount(body),
            entity_id: Some(envelope.aggregate_id()),
            third_party_id: id_field(body, "third_party_id"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::TenantId;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(event_type: &str, payload: Value) -> JsonEnvelope {
        JsonEnvelope::new(Uuid::now_v7(), TenantId::new(), AggregateId::new(), "x", 1, payload)
            .with_event_type(event_type)
    }

    #[test]
    fn full_payment_fires_paid() {
        let tp = AggregateId::new();
        let env = envelope(
            "invoicing.invoice.payment_registered",
            json!({"PaymentRegistered": {"status": "paid", "total": 12_000, "third_party_id": tp.to_string()}}),
        );
        let t = trigger_for(&env).unwrap();
        assert_eq!((t.entity, t.event), ("INVOICE", "PAID"));
        assert_eq!(t.context.status.as_deref(), Some("PAID"));
        assert_eq!(t.context.amount, Some(12_000));
        assert_eq!(t.context.third_party_id, Some(tp));
        assert_eq!(t.context.entity_id, Some(env.aggregate_id()));
    }

    #[test]
    fn partial_payment_fires_nothing() {
        let env = envelope(
            "invoicing.invoice.payment_registered",
            json!({"PaymentRegistered": {"status": "partially_paid"}}),
        );
        assert!(trigger_for(&env).is_none());
    }

    #[test]
    fn creation_reads_nested_totals() {
        let env = envelope(
            "invoicing.invoice.created",
            json!({"Created": {"totals": {"total": 500}}}),
        );
        let t = trigger_for(&env).unwrap();
        assert_eq!(t.context.amount, Some(500));
        assert_eq!(t.context.status.as_deref(), Some("DRAFT"));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert!(trigger_for(&envelope("sales.order.shipped", json!({}))).is_none());
    }
}
