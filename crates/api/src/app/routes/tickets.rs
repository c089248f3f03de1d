use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use atelier_core::{AggregateId, AggregateRoot, TenantId};
use atelier_infra::ReferenceKind;
use atelier_ticketing::{
    AddTicketComment, AssignTicket, ChangeTicketPriority, ChangeTicketStatus, OpenTicket, TICKET_AGGREGATE, Ticket,
    TicketCommand, TicketId, TicketPriority, TicketStatus,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::routes::parties::existing_third_party;
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn ticket_router() -> Router {
    Router::new()
        .route("/", post(open_ticket).get(list_tickets))
        .route("/:id", get(get_ticket))
        .route("/:id/assign", post(assign_ticket))
        .route("/:id/status", post(change_status))
        .route("/:id/priority", post(change_priority))
        .route("/:id/comments", post(add_comment))
}

fn make_ticket(id: AggregateId) -> Ticket {
    Ticket::empty(TicketId::new(id))
}

#[derive(Debug, Deserialize)]
struct OpenTicketRequest {
    subject: String,
    description: Option<String>,
    #[serde(default)]
    priority: TicketPriority,
    third_party_id: Option<String>,
}

async fn open_ticket(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<OpenTicketRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let third_party_id = match body.third_party_id.as_deref() {
        Some(raw) => Some(*existing_third_party(&app, t, raw)?.id()),
        None => None,
    };

    let id = TicketId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        TicketCommand::Open(OpenTicket {
            tenant_id: t,
            ticket_id: id,
            reference: app.backend.next_reference(t, ReferenceKind::Ticket),
            subject: body.subject,
            description: body.description,
            priority: body.priority,
            requester: scope.user_id(),
            third_party_id,
            occurred_at: Utc::now(),
        }),
        "tickets.write",
    )?;
    let committed = app.backend.execute(t, id.0, TICKET_AGGREGATE, cmd, make_ticket)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListTicketsQuery {
    q: Option<String>,
    status: Option<String>,
    #[serde(default)]
    assigned_to_me: bool,
}

async fn list_tickets(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult {
    require(&scope, "tickets.read")?;
    let status: Option<TicketStatus> = query.status.as_deref().map(|s| dto::parse_enum("status", s)).transpose()?;
    let q = query.q.unwrap_or_default();
    let me = scope.user_id();

    let mut found = app.backend.read.tickets.filter(scope.tenant_id(), |ticket| {
        status.is_none_or(|s| ticket.status() == s)
            && (!query.assigned_to_me || ticket.assignee() == Some(me))
            && (q.is_empty() || dto::contains_ci(ticket.subject(), &q) || dto::contains_ci(ticket.reference(), &q))
    });
    // Most urgent first, then newest reference.
    found.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| b.reference().cmp(a.reference()))
    });
    Ok(dto::items(found.iter().map(dto::ticket_view).collect()))
}

async fn get_ticket(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "tickets.read")?;
    let id = dto::parse_id(&id, "ticket")?;
    let ticket = app
        .backend
        .read
        .tickets
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("ticket"))?;
    Ok(dto::ok(dto::ticket_view(&ticket)))
}

fn run_ticket(
    app: &AppState,
    scope: &Scope,
    id: &str,
    build: impl FnOnce(TenantId, TicketId) -> TicketCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = TicketId::new(dto::parse_id(id, "ticket")?);
    let cmd = authorized(scope, build(t, id), "tickets.write")?;
    let committed = app.backend.execute(t, id.0, TICKET_AGGREGATE, cmd, make_ticket)?;
    Ok(dto::applied(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    /// Omitted or null unassigns.
    assignee: Option<String>,
}

async fn assign_ticket(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> ApiResult {
    let assignee = body.assignee.as_deref().map(dto::parse_user).transpose()?;
    run_ticket(&app, &scope, &id, |tenant_id, ticket_id| {
        TicketCommand::Assign(AssignTicket {
            tenant_id,
            ticket_id,
            assignee,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

async fn change_status(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult {
    let status: TicketStatus = dto::parse_enum("status", &body.status)?;
    run_ticket(&app, &scope, &id, |tenant_id, ticket_id| {
        TicketCommand::ChangeStatus(ChangeTicketStatus {
            tenant_id,
            ticket_id,
            status,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Deserialize)]
struct PriorityRequest {
    priority: String,
}

async fn change_priority(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<PriorityRequest>,
) -> ApiResult {
    let priority: TicketPriority = dto::parse_enum("priority", &body.priority)?;
    run_ticket(&app, &scope, &id, |tenant_id, ticket_id| {
        TicketCommand::ChangePriority(ChangeTicketPriority {
            tenant_id,
            ticket_id,
            priority,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    content: String,
}

async fn add_comment(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> ApiResult {
    let author = scope.user_id();
    run_ticket(&app, &scope, &id, |tenant_id, ticket_id| {
        TicketCommand::AddComment(AddTicketComment {
            tenant_id,
            ticket_id,
            comment_id: AggregateId::new(),
            author,
            content: body.content,
            occurred_at: Utc::now(),
        })
    })
}
