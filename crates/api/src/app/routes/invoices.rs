use axum::{
    extract::{Extension, Path, Query},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use atelier_core::{AggregateId, AggregateRoot, TenantId};
use atelier_infra::ReferenceKind;
use atelier_invoicing::{
    AddInvoiceLine, CreateInvoice, INVOICE_AGGREGATE, Invoice, InvoiceCommand, InvoiceId, InvoiceKind, InvoiceStatus,
    InvoiceTransition, PaymentId, PaymentMethod, RegisterPayment, RemoveInvoiceLine, SetInvoiceDiscount,
    UpdateInvoiceHeader,
};
use atelier_sales::{LineInput, price_lines};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::routes::parties::existing_third_party;
use crate::app::routes::sales::{DiscountRequest, document_currency};
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn invoice_router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice).patch(update_invoice_header))
        .route("/:id/lines", post(add_invoice_line))
        .route("/:id/lines/:line_no", delete(remove_invoice_line))
        .route("/:id/discount", post(set_invoice_discount))
        .route("/:id/validate", post(validate_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/payments", post(register_payment).get(list_payments))
}

fn make_invoice(id: AggregateId) -> Invoice {
    Invoice::empty(InvoiceId::new(id))
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceRequest {
    #[serde(default)]
    kind: InvoiceKind,
    third_party_id: String,
    order_id: Option<String>,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    currency: Option<String>,
    #[serde(default)]
    lines: Vec<LineInput>,
}

/// Create a draft invoice. When `order_id` is given and no lines are sent,
/// the order's lines and discount are carried over.
async fn create_invoice(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateInvoiceRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let party = existing_third_party(&app, t, &body.third_party_id)?;

    let order = match body.order_id.as_deref() {
        Some(raw) => {
            let id = dto::parse_id(raw, "order")?;
            Some(
                app.backend
                    .read
                    .orders
                    .get(t, id)
                    .ok_or_else(|| ApiError::not_found("order"))?,
            )
        }
        None => None,
    };

    let (lines, carried_discount) = match &order {
        Some(order) if body.lines.is_empty() => (order.lines().to_vec(), order.totals().discount_amount),
        _ => (price_lines(&body.lines)?, 0),
    };
    let currency = match (&order, body.currency) {
        (Some(order), None) => order.currency().to_string(),
        (_, requested) => document_currency(&app, t, requested),
    };
    let reference_kind = match body.kind {
        InvoiceKind::Sales => ReferenceKind::SalesInvoice,
        InvoiceKind::Purchase => ReferenceKind::PurchaseInvoice,
    };

    let id = InvoiceId::new(AggregateId::new());
    let now = Utc::now();
    let cmd = authorized(
        &scope,
        InvoiceCommand::Create(CreateInvoice {
            tenant_id: t,
            invoice_id: id,
            kind: body.kind,
            reference: app.backend.next_reference(t, reference_kind),
            third_party_id: *party.id(),
            order_id: order.as_ref().map(|o| *o.id()),
            issue_date: body.issue_date.unwrap_or_else(dto::today),
            due_date: body.due_date,
            payment_terms_days: Some(party.payment_terms_days()),
            currency,
            lines,
            occurred_at: now,
        }),
        "invoices.write",
    )?;
    let mut committed = app.backend.execute(t, id.0, INVOICE_AGGREGATE, cmd, make_invoice)?.len();

    if carried_discount > 0 {
        let discount = InvoiceCommand::SetDiscount(SetInvoiceDiscount {
            tenant_id: t,
            invoice_id: id,
            discount_amount: carried_discount,
            occurred_at: now,
        });
        committed += app.backend.execute(t, id.0, INVOICE_AGGREGATE, discount, make_invoice)?.len();
    }
    Ok(dto::created(id.0, committed))
}

#[derive(Debug, Deserialize)]
struct ListInvoicesQuery {
    kind: Option<String>,
    status: Option<String>,
    third_party_id: Option<String>,
    #[serde(default)]
    overdue: bool,
}

async fn list_invoices(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListInvoicesQuery>,
) -> ApiResult {
    require(&scope, "invoices.read")?;
    let kind: Option<InvoiceKind> = query.kind.as_deref().map(|k| dto::parse_enum("kind", k)).transpose()?;
    let status: Option<InvoiceStatus> = query.status.as_deref().map(|s| dto::parse_enum("status", s)).transpose()?;
    let party = query
        .third_party_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "third party"))
        .transpose()?;
    let today = dto::today();

    let mut found = app.backend.read.invoices.filter(scope.tenant_id(), |i| {
        kind.is_none_or(|k| i.kind() == k)
            && status.is_none_or(|s| i.status() == s)
            && party.is_none_or(|id| i.third_party_id().is_some_and(|t| t.0 == id))
            && (!query.overdue || i.is_overdue(today))
    });
    found.sort_by(|a, b| b.reference().cmp(a.reference()));
    Ok(dto::items(found.iter().map(|i| dto::invoice_view(i, today)).collect()))
}

fn load_invoice(app: &AppState, tenant_id: TenantId, raw: &str) -> Result<Invoice, ApiError> {
    let id = dto::parse_id(raw, "invoice")?;
    app.backend
        .read
        .invoices
        .get(tenant_id, id)
        .ok_or_else(|| ApiError::not_found("invoice"))
}

async fn get_invoice(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "invoices.read")?;
    let invoice = load_invoice(&app, scope.tenant_id(), &id)?;
    Ok(dto::ok(dto::invoice_view(&invoice, dto::today())))
}

fn run_invoice(
    app: &AppState,
    scope: &Scope,
    id: &str,
    build: impl FnOnce(TenantId, InvoiceId) -> InvoiceCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = InvoiceId::new(dto::parse_id(id, "invoice")?);
    let cmd = authorized(scope, build(t, id), "invoices.write")?;
    let committed = app.backend.execute(t, id.0, INVOICE_AGGREGATE, cmd, make_invoice)?;
    Ok(dto::applied(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct InvoiceHeaderRequest {
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
}

async fn update_invoice_header(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<InvoiceHeaderRequest>,
) -> ApiResult {
    run_invoice(&app, &scope, &id, |tenant_id, invoice_id| {
        InvoiceCommand::UpdateHeader(UpdateInvoiceHeader {
            tenant_id,
            invoice_id,
            issue_date: body.issue_date,
            due_date: body.due_date,
            occurred_at: Utc::now(),
        })
    })
}

async fn add_invoice_line(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(line): Json<LineInput>,
) -> ApiResult {
    run_invoice(&app, &scope, &id, |tenant_id, invoice_id| {
        InvoiceCommand::AddLine(AddInvoiceLine {
            tenant_id,
            invoice_id,
            line,
            occurred_at: Utc::now(),
        })
    })
}

async fn remove_invoice_line(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    run_invoice(&app, &scope, &id, |tenant_id, invoice_id| {
        InvoiceCommand::RemoveLine(RemoveInvoiceLine {
            tenant_id,
            invoice_id,
            line_no,
            occurred_at: Utc::now(),
        })
    })
}

async fn set_invoice_discount(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<DiscountRequest>,
) -> ApiResult {
    run_invoice(&app, &scope, &id, |tenant_id, invoice_id| {
        InvoiceCommand::SetDiscount(SetInvoiceDiscount {
            tenant_id,
            invoice_id,
            discount_amount: body.discount_amount,
            occurred_at: Utc::now(),
        })
    })
}

fn transition(command: fn(InvoiceTransition) -> InvoiceCommand) -> impl FnOnce(TenantId, InvoiceId) -> InvoiceCommand {
    move |tenant_id, invoice_id| {
        command(InvoiceTransition {
            tenant_id,
            invoice_id,
            occurred_at: Utc::now(),
        })
    }
}

async fn validate_invoice(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_invoice(&app, &scope, &id, transition(InvoiceCommand::Validate))
}

async fn send_invoice(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_invoice(&app, &scope, &id, transition(InvoiceCommand::MarkSent))
}

async fn cancel_invoice(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_invoice(&app, &scope, &id, transition(InvoiceCommand::Cancel))
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    amount: i64,
    paid_on: Option<NaiveDate>,
    #[serde(default)]
    method: PaymentMethod,
    reference: Option<String>,
    bank_account_id: Option<String>,
}

/// Record a payment; with a bank account the matching movement is booked too.
async fn register_payment(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let invoice_id = InvoiceId::new(dto::parse_id(&id, "invoice")?);
    let bank_account_id = body
        .bank_account_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "bank account"))
        .transpose()?;

    let payment_id = PaymentId::new(AggregateId::new());
    let payment = RegisterPayment {
        tenant_id: t,
        invoice_id,
        payment_id,
        amount: body.amount,
        paid_on: body.paid_on.unwrap_or_else(dto::today),
        method: body.method,
        reference: body.reference,
        bank_account_id,
        occurred_at: Utc::now(),
    };
    require(&scope, "invoices.write")?;
    if bank_account_id.is_some() {
        require(&scope, "bank.write")?;
    }
    let committed = app.backend.register_payment(payment)?;
    Ok(dto::created(payment_id.0, committed.len()))
}

async fn list_payments(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "invoices.read")?;
    let invoice = load_invoice(&app, scope.tenant_id(), &id)?;
    Ok(dto::ok(json!({
        "items": invoice.payments(),
        "amount_paid": invoice.amount_paid(),
        "amount_remaining": invoice.amount_remaining(),
    })))
}
