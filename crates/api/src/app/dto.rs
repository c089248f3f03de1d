//! Request parsing helpers and JSON views of read models.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use atelier_agenda::AgendaEvent;
use atelier_bank::{BankAccount, Movement};
use atelier_catalog::{Category, Product};
use atelier_core::{AggregateId, AggregateRoot, UserId};
use atelier_dolibarr::{ImportConfig, ImportRun};
use atelier_ged::Document;
use atelier_hr::{Contract, Employee, LeaveRequest};
use atelier_invoicing::Invoice;
use atelier_parties::{Contact, ThirdParty};
use atelier_sales::{Proposal, SalesOrder};
use atelier_tenancy::Tenant;
use atelier_ticketing::Ticket;

use crate::app::errors::ApiError;

// -------------------------
// Parsing
// -------------------------

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id(what))
}

pub fn parse_user(raw: &str) -> Result<UserId, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id("user"))
}

/// Parse a query value with the same spelling the type uses on the wire
/// (`partially_paid`, `in_progress`, ...).
pub fn parse_enum<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T, ApiError> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase()))
        .map_err(|_| ApiError::bad_request(format!("invalid {field}: {raw}")))
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

// -------------------------
// Responses
// -------------------------

/// 201 for a command that created `id`.
pub fn created(id: AggregateId, events_committed: usize) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "id": id.to_string(), "events_committed": events_committed })),
    )
        .into_response()
}

/// 200 for a command applied to an existing `id`.
pub fn applied(id: AggregateId, events_committed: usize) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "id": id.to_string(), "events_committed": events_committed })),
    )
        .into_response()
}

pub fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn items(items: Vec<Value>) -> Response {
    ok(json!({ "items": items }))
}

// -------------------------
// Views
// -------------------------

pub fn tenant_view(t: &Tenant) -> Value {
    json!({
        "id": t.id.to_string(),
        "code": t.code,
        "name": t.name,
        "legal_name": t.legal_name,
        "email": t.email,
        "country_code": t.country_code,
        "default_locale": t.default_locale,
        "default_currency": t.default_currency,
        "timezone": t.timezone,
        "plan": t.plan,
        "active": t.active,
        "created_at": t.created_at,
    })
}

pub fn third_party_view(t: &ThirdParty) -> Value {
    json!({
        "id": t.id().0.to_string(),
        "code": t.code(),
        "name": t.name(),
        "kind": t.kind(),
        "status": t.status(),
        "details": t.details(),
        "payment_terms_days": t.payment_terms_days(),
        "credit_limit": t.credit_limit(),
        "version": t.version(),
    })
}

pub fn contact_view(c: &Contact) -> Value {
    json!({
        "id": c.id().0.to_string(),
        "display_name": c.profile().display_name(),
        "profile": c.profile(),
        "primary": c.is_primary(),
        "links": c.links(),
        "version": c.version(),
    })
}

pub fn category_view(c: &Category) -> Value {
    json!({
        "id": c.id().0.to_string(),
        "code": c.code(),
        "label": c.label(),
        "parent_id": c.parent_id().map(|p| p.0.to_string()),
    })
}

pub fn product_view(p: &Product) -> Value {
    json!({
        "id": p.id().0.to_string(),
        "code": p.code(),
        "profile": p.profile(),
        "active": p.is_active(),
        "version": p.version(),
    })
}

pub fn proposal_view(p: &Proposal) -> Value {
    json!({
        "id": p.id().0.to_string(),
        "reference": p.reference(),
        "status": p.status(),
        "third_party_id": p.third_party_id().map(|t| t.0.to_string()),
        "issue_date": p.issue_date(),
        "valid_until": p.valid_until(),
        "currency": p.currency(),
        "notes": p.notes(),
        "lines": p.lines(),
        "totals": p.totals(),
        "order_id": p.order_id().map(|o| o.to_string()),
        "version": p.version(),
    })
}

pub fn order_view(o: &SalesOrder) -> Value {
    json!({
        "id": o.id().0.to_string(),
        "reference": o.reference(),
        "status": o.status(),
        "proposal_id": o.proposal_id().map(|p| p.0.to_string()),
        "third_party_id": o.third_party_id().map(|t| t.0.to_string()),
        "order_date": o.order_date(),
        "expected_delivery": o.expected_delivery(),
        "currency": o.currency(),
        "lines": o.lines(),
        "totals": o.totals(),
        "version": o.version(),
    })
}

pub fn invoice_view(i: &Invoice, today: NaiveDate) -> Value {
    json!({
        "id": i.id().0.to_string(),
        "kind": i.kind(),
        "reference": i.reference(),
        "status": i.status(),
        "third_party_id": i.third_party_id().map(|t| t.0.to_string()),
        "order_id": i.order_id().map(|o| o.0.to_string()),
        "issue_date": i.issue_date(),
        "due_date": i.due_date(),
        "currency": i.currency(),
        "lines": i.lines(),
        "totals": i.totals(),
        "amount_paid": i.amount_paid(),
        "amount_remaining": i.amount_remaining(),
        "overdue": i.is_overdue(today),
        "version": i.version(),
    })
}

pub fn bank_account_view(a: &BankAccount) -> Value {
    json!({
        "id": a.id().0.to_string(),
        "name": a.name(),
        "iban": a.iban(),
        "bic": a.bic(),
        "currency": a.currency(),
        "active": a.is_active(),
        "balance": a.balance(),
    })
}

pub fn movement_view(m: &Movement) -> Value {
    json!({
        "id": m.movement_id.to_string(),
        "value_date": m.value_date,
        "amount": m.amount,
        "description": m.description,
        "reference": m.reference,
        "payment_id": m.payment_id.map(|p| p.to_string()),
        "invoice_id": m.invoice_id.map(|i| i.to_string()),
    })
}

pub fn employee_view(e: &Employee) -> Value {
    json!({
        "id": e.id().0.to_string(),
        "employee_number": e.employee_number(),
        "full_name": e.profile().map(|p| p.full_name()),
        "profile": e.profile(),
        "hire_date": e.hire_date(),
        "termination_date": e.termination_date(),
        "status": e.status(),
    })
}

pub fn contract_view(c: &Contract) -> Value {
    json!({
        "id": c.id().0.to_string(),
        "terms": c.terms(),
        "status": c.status(),
    })
}

pub fn leave_view(l: &LeaveRequest) -> Value {
    json!({
        "id": l.id().0.to_string(),
        "requester": l.requester(),
        "period": l.period(),
        "half_days": l.period().map(|p| p.working_half_days()),
        "status": l.status(),
        "validator": l.validator(),
        "response_comment": l.response_comment(),
        "submitted_at": l.submitted_at(),
        "approved_at": l.approved_at(),
        "denied_at": l.denied_at(),
    })
}

pub fn document_view(d: &Document) -> Value {
    json!({
        "id": d.id().0.to_string(),
        "meta": d.meta(),
    })
}

pub fn ticket_view(t: &Ticket) -> Value {
    json!({
        "id": t.id().0.to_string(),
        "reference": t.reference(),
        "subject": t.subject(),
        "description": t.description(),
        "status": t.status(),
        "priority": t.priority(),
        "requester": t.requester(),
        "assignee": t.assignee(),
        "third_party_id": t.third_party_id().map(|p| p.0.to_string()),
        "comments": t.comments(),
    })
}

pub fn agenda_view(e: &AgendaEvent) -> Value {
    json!({
        "id": e.id().0.to_string(),
        "details": e.details(),
        "status": e.status(),
        "organizer": e.organizer(),
        "attendees": e.attendees(),
    })
}

pub fn import_run_view(r: &ImportRun) -> Value {
    json!(r)
}

/// The API key never leaves the server.
pub fn import_config_view(c: &ImportConfig) -> Value {
    json!({
        "id": c.id.to_string(),
        "base_url": c.base_url,
        "api_key_set": !c.api_key.is_empty(),
    })
}
