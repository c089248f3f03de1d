use axum::{
    extract::{Extension, Path, Query},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use atelier_core::{AggregateId, AggregateRoot, TenantId};
use atelier_infra::ReferenceKind;
use atelier_sales::{
    AddProposalLine, CreateOrderFromProposal, CreateProposal, CreateSalesOrder, LineInput, MarkProposalConverted,
    OrderStatus, OrderTransition, PROPOSAL_AGGREGATE, Proposal, ProposalCommand, ProposalId, ProposalStatus,
    ProposalTransition, RemoveProposalLine, SALES_ORDER_AGGREGATE, SalesOrder, SalesOrderCommand, SalesOrderId,
    SetProposalDiscount, UpdateProposalHeader,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::routes::parties::existing_third_party;
use crate::app::{AppState, dto};
use crate::context::Scope;

const FALLBACK_CURRENCY: &str = "EUR";

pub fn proposal_router() -> Router {
    Router::new()
        .route("/", post(create_proposal).get(list_proposals))
        .route("/:id", get(get_proposal).patch(update_proposal_header))
        .route("/:id/lines", post(add_proposal_line))
        .route("/:id/lines/:line_no", delete(remove_proposal_line))
        .route("/:id/discount", post(set_proposal_discount))
        .route("/:id/send", post(send_proposal))
        .route("/:id/accept", post(accept_proposal))
        .route("/:id/refuse", post(refuse_proposal))
        .route("/:id/cancel", post(cancel_proposal))
        .route("/:id/convert", post(convert_proposal))
}

pub fn order_router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/process", post(process_order))
        .route("/:id/ship", post(ship_order))
        .route("/:id/deliver", post(deliver_order))
        .route("/:id/cancel", post(cancel_order))
}

fn make_proposal(id: AggregateId) -> Proposal {
    Proposal::empty(ProposalId::new(id))
}

fn make_order(id: AggregateId) -> SalesOrder {
    SalesOrder::empty(SalesOrderId::new(id))
}

/// Currency for a new document: explicit, else the tenant default.
pub(crate) fn document_currency(app: &AppState, tenant_id: TenantId, requested: Option<String>) -> String {
    requested
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .or_else(|| app.backend.tenants.find_by_id(tenant_id).map(|t| t.default_currency))
        .unwrap_or_else(|| FALLBACK_CURRENCY.to_string())
}

// -------------------------
// Proposals
// -------------------------

#[derive(Debug, Deserialize)]
struct CreateProposalRequest {
    third_party_id: String,
    issue_date: Option<NaiveDate>,
    valid_until: Option<NaiveDate>,
    currency: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    lines: Vec<LineInput>,
}

async fn create_proposal(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateProposalRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let party = existing_third_party(&app, t, &body.third_party_id)?;
    let id = ProposalId::new(AggregateId::new());
    let now = Utc::now();

    let cmd = authorized(
        &scope,
        ProposalCommand::Create(CreateProposal {
            tenant_id: t,
            proposal_id: id,
            reference: app.backend.next_reference(t, ReferenceKind::Proposal),
            third_party_id: *party.id(),
            issue_date: body.issue_date.unwrap_or_else(dto::today),
            valid_until: body.valid_until,
            currency: document_currency(&app, t, body.currency),
            notes: body.notes,
            occurred_at: now,
        }),
        "proposals.write",
    )?;
    let mut committed = app.backend.execute(t, id.0, PROPOSAL_AGGREGATE, cmd, make_proposal)?.len();

    for line in body.lines {
        let add = ProposalCommand::AddLine(AddProposalLine {
            tenant_id: t,
            proposal_id: id,
            line,
            occurred_at: now,
        });
        committed += app.backend.execute(t, id.0, PROPOSAL_AGGREGATE, add, make_proposal)?.len();
    }
    Ok(dto::created(id.0, committed))
}

#[derive(Debug, Deserialize)]
struct ListDocumentsQuery {
    status: Option<String>,
    third_party_id: Option<String>,
}

async fn list_proposals(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult {
    require(&scope, "proposals.read")?;
    let status: Option<ProposalStatus> = query.status.as_deref().map(|s| dto::parse_enum("status", s)).transpose()?;
    let party = query
        .third_party_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "third party"))
        .transpose()?;

    let mut found = app.backend.read.proposals.filter(scope.tenant_id(), |p| {
        status.is_none_or(|s| p.status() == s) && party.is_none_or(|id| p.third_party_id().is_some_and(|t| t.0 == id))
    });
    found.sort_by(|a, b| b.reference().cmp(a.reference()));
    Ok(dto::items(found.iter().map(dto::proposal_view).collect()))
}

fn load_proposal(app: &AppState, tenant_id: TenantId, raw: &str) -> Result<Proposal, ApiError> {
    let id = dto::parse_id(raw, "proposal")?;
    app.backend
        .read
        .proposals
        .get(tenant_id, id)
        .ok_or_else(|| ApiError::not_found("proposal"))
}

async fn get_proposal(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "proposals.read")?;
    let proposal = load_proposal(&app, scope.tenant_id(), &id)?;
    Ok(dto::ok(dto::proposal_view(&proposal)))
}

/// Authorize and run one proposal command against `id`.
fn run_proposal(
    app: &AppState,
    scope: &Scope,
    id: &str,
    build: impl FnOnce(TenantId, ProposalId) -> ProposalCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ProposalId::new(dto::parse_id(id, "proposal")?);
    let cmd = authorized(scope, build(t, id), "proposals.write")?;
    let committed = app.backend.execute(t, id.0, PROPOSAL_AGGREGATE, cmd, make_proposal)?;
    Ok(dto::applied(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ProposalHeaderRequest {
    issue_date: Option<NaiveDate>,
    valid_until: Option<NaiveDate>,
    notes: Option<String>,
}

async fn update_proposal_header(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<ProposalHeaderRequest>,
) -> ApiResult {
    run_proposal(&app, &scope, &id, |tenant_id, proposal_id| {
        ProposalCommand::UpdateHeader(UpdateProposalHeader {
            tenant_id,
            proposal_id,
            issue_date: body.issue_date,
            valid_until: body.valid_until,
            notes: body.notes,
            occurred_at: Utc::now(),
        })
    })
}

async fn add_proposal_line(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(line): Json<LineInput>,
) -> ApiResult {
    run_proposal(&app, &scope, &id, |tenant_id, proposal_id| {
        ProposalCommand::AddLine(AddProposalLine {
            tenant_id,
            proposal_id,
            line,
            occurred_at: Utc::now(),
        })
    })
}

async fn remove_proposal_line(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    run_proposal(&app, &scope, &id, |tenant_id, proposal_id| {
        ProposalCommand::RemoveLine(RemoveProposalLine {
            tenant_id,
            proposal_id,
            line_no,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscountRequest {
    pub discount_amount: i64,
}

async fn set_proposal_discount(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<DiscountRequest>,
) -> ApiResult {
    run_proposal(&app, &scope, &id, |tenant_id, proposal_id| {
        ProposalCommand::SetDiscount(SetProposalDiscount {
            tenant_id,
            proposal_id,
            discount_amount: body.discount_amount,
            occurred_at: Utc::now(),
        })
    })
}

fn transition(command: fn(ProposalTransition) -> ProposalCommand) -> impl FnOnce(TenantId, ProposalId) -> ProposalCommand {
    move |tenant_id, proposal_id| {
        command(ProposalTransition {
            tenant_id,
            proposal_id,
            occurred_at: Utc::now(),
        })
    }
}

async fn send_proposal(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_proposal(&app, &scope, &id, transition(ProposalCommand::Send))
}

async fn accept_proposal(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_proposal(&app, &scope, &id, transition(ProposalCommand::Accept))
}

async fn refuse_proposal(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_proposal(&app, &scope, &id, transition(ProposalCommand::Refuse))
}

async fn cancel_proposal(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_proposal(&app, &scope, &id, transition(ProposalCommand::Cancel))
}

#[derive(Debug, Default, Deserialize)]
struct ConvertRequest {
    order_date: Option<NaiveDate>,
    expected_delivery: Option<NaiveDate>,
}

/// Create an order from an accepted proposal, then mark the proposal converted.
async fn convert_proposal(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<ConvertRequest>>,
) -> ApiResult {
    let t = scope.tenant_id();
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let proposal = load_proposal(&app, t, &id)?;
    let snapshot = proposal
        .snapshot()
        .ok_or_else(|| ApiError::from(atelier_core::DomainError::invariant("proposal has no customer")))?;

    let order_id = SalesOrderId::new(AggregateId::new());
    let now = Utc::now();
    let cmd = authorized(
        &scope,
        SalesOrderCommand::CreateFromProposal(CreateOrderFromProposal {
            tenant_id: t,
            order_id,
            reference: app.backend.next_reference(t, ReferenceKind::Order),
            proposal: snapshot,
            order_date: body.order_date.unwrap_or_else(dto::today),
            expected_delivery: body.expected_delivery,
            occurred_at: now,
        }),
        "orders.write",
    )?;
    let mut committed = app
        .backend
        .execute(t, order_id.0, SALES_ORDER_AGGREGATE, cmd, make_order)?
        .len();

    let mark = ProposalCommand::MarkConverted(MarkProposalConverted {
        tenant_id: t,
        proposal_id: *proposal.id(),
        order_id: order_id.0,
        occurred_at: now,
    });
    committed += app
        .backend
        .execute(t, proposal.id().0, PROPOSAL_AGGREGATE, mark, make_proposal)?
        .len();
    Ok(dto::created(order_id.0, committed))
}

// -------------------------
// Orders
// -------------------------

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    third_party_id: String,
    order_date: Option<NaiveDate>,
    expected_delivery: Option<NaiveDate>,
    currency: Option<String>,
    #[serde(default)]
    lines: Vec<LineInput>,
    #[serde(default)]
    discount_amount: i64,
}

async fn create_order(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateOrderRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let party = existing_third_party(&app, t, &body.third_party_id)?;
    let id = SalesOrderId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id: t,
            order_id: id,
            reference: app.backend.next_reference(t, ReferenceKind::Order),
            third_party_id: *party.id(),
            order_date: body.order_date.unwrap_or_else(dto::today),
            expected_delivery: body.expected_delivery,
            currency: document_currency(&app, t, body.currency),
            lines: body.lines,
            discount_amount: body.discount_amount,
            occurred_at: Utc::now(),
        }),
        "orders.write",
    )?;
    let committed = app.backend.execute(t, id.0, SALES_ORDER_AGGREGATE, cmd, make_order)?;
    Ok(dto::created(id.0, committed.len()))
}

async fn list_orders(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult {
    require(&scope, "orders.read")?;
    let status: Option<OrderStatus> = query.status.as_deref().map(|s| dto::parse_enum("status", s)).transpose()?;
    let party = query
        .third_party_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "third party"))
        .transpose()?;

    let mut found = app.backend.read.orders.filter(scope.tenant_id(), |o| {
        status.is_none_or(|s| o.status() == s) && party.is_none_or(|id| o.third_party_id().is_some_and(|t| t.0 == id))
    });
    found.sort_by(|a, b| b.reference().cmp(a.reference()));
    Ok(dto::items(found.iter().map(dto::order_view).collect()))
}

async fn get_order(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "orders.read")?;
    let id = dto::parse_id(&id, "order")?;
    let order = app
        .backend
        .read
        .orders
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("order"))?;
    Ok(dto::ok(dto::order_view(&order)))
}

async fn order_transition(
    app: AppState,
    scope: Scope,
    id: String,
    command: fn(OrderTransition) -> SalesOrderCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = SalesOrderId::new(dto::parse_id(&id, "order")?);
    let cmd = authorized(
        &scope,
        command(OrderTransition {
            tenant_id: t,
            order_id: id,
            occurred_at: Utc::now(),
        }),
        "orders.write",
    )?;
    let committed = app.backend.execute(t, id.0, SALES_ORDER_AGGREGATE, cmd, make_order)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn process_order(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    order_transition(app, scope, id, SalesOrderCommand::StartProcessing).await
}

async fn ship_order(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    order_transition(app, scope, id, SalesOrderCommand::Ship).await
}

async fn deliver_order(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    order_transition(app, scope, id, SalesOrderCommand::Deliver).await
}

async fn cancel_order(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    order_transition(app, scope, id, SalesOrderCommand::Cancel).await
}
