use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use atelier_core::{AggregateId, TenantId, UserId};
use atelier_hr::{
    CreateLeaveRequest, DecideLeaveRequest, LEAVE_REQUEST_AGGREGATE, LeavePeriod, LeaveRequest, LeaveRequestCommand,
    LeaveRequestId, LeaveStatus, SubmitLeaveRequest, UpdateLeaveRequest,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn leave_router() -> Router {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/:id", get(get_request).patch(update_request))
        .route("/:id/submit", post(submit_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/deny", post(deny_request))
        .route("/:id/reopen", post(reopen_request))
}

fn make_request(id: AggregateId) -> LeaveRequest {
    LeaveRequest::empty(LeaveRequestId::new(id))
}

/// The leave type must be one of the tenant's configured types.
fn check_leave_type(app: &AppState, tenant_id: TenantId, period: &LeavePeriod) -> Result<(), ApiError> {
    let known = app.backend.hr.leave_types(tenant_id, Utc::now())?;
    let code = period.leave_type.trim().to_uppercase();
    if known.iter().any(|t| t.code == code) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("unknown leave type {code}")))
    }
}

async fn create_request(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(period): Json<LeavePeriod>,
) -> ApiResult {
    let t = scope.tenant_id();
    check_leave_type(&app, t, &period)?;

    let id = LeaveRequestId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        LeaveRequestCommand::Create(CreateLeaveRequest {
            tenant_id: t,
            request_id: id,
            requester: scope.user_id(),
            period,
            occurred_at: Utc::now(),
        }),
        "leave.write",
    )?;
    let committed = app
        .backend
        .execute(t, id.0, LEAVE_REQUEST_AGGREGATE, cmd, make_request)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListRequestsQuery {
    status: Option<String>,
    /// Only the caller's own requests.
    #[serde(default)]
    mine: bool,
    /// Only pending requests the caller has to decide.
    #[serde(default)]
    to_validate: bool,
}

async fn list_requests(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult {
    require(&scope, "leave.read")?;
    let status: Option<LeaveStatus> = query.status.as_deref().map(|s| dto::parse_enum("status", s)).transpose()?;
    let me = scope.user_id();

    let mut found = app.backend.read.leave_requests.filter(scope.tenant_id(), |r| {
        status.is_none_or(|s| r.status() == s)
            && (!query.mine || r.requester() == Some(me))
            && (!query.to_validate || (r.status() == LeaveStatus::PendingApproval && r.validator() == Some(me)))
    });
    found.sort_by_key(|r| std::cmp::Reverse(r.period().map(|p| p.date_start)));
    Ok(dto::items(found.iter().map(dto::leave_view).collect()))
}

async fn get_request(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "leave.read")?;
    let id = dto::parse_id(&id, "leave request")?;
    let request = app
        .backend
        .read
        .leave_requests
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("leave request"))?;
    Ok(dto::ok(dto::leave_view(&request)))
}

fn run_request(
    app: &AppState,
    scope: &Scope,
    id: &str,
    build: impl FnOnce(TenantId, LeaveRequestId, UserId) -> LeaveRequestCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = LeaveRequestId::new(dto::parse_id(id, "leave request")?);
    let cmd = authorized(scope, build(t, id, scope.user_id()), "leave.write")?;
    let committed = app
        .backend
        .execute(t, id.0, LEAVE_REQUEST_AGGREGATE, cmd, make_request)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn update_request(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(period): Json<LeavePeriod>,
) -> ApiResult {
    check_leave_type(&app, scope.tenant_id(), &period)?;
    run_request(&app, &scope, &id, |tenant_id, request_id, acting_user| {
        LeaveRequestCommand::Update(UpdateLeaveRequest {
            tenant_id,
            request_id,
            acting_user,
            period,
            occurred_at: Utc::now(),
        })
    })
}

/// Submission routes the request to the requester's configured validator.
async fn submit_request(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    let validator = app.backend.hr.validator_for(scope.tenant_id(), scope.user_id());
    run_request(&app, &scope, &id, |tenant_id, request_id, acting_user| {
        LeaveRequestCommand::Submit(SubmitLeaveRequest {
            tenant_id,
            request_id,
            acting_user,
            validator,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Default, Deserialize)]
struct DecisionRequest {
    comment: Option<String>,
}

fn decision(
    command: fn(DecideLeaveRequest) -> LeaveRequestCommand,
    body: Option<Json<DecisionRequest>>,
) -> impl FnOnce(TenantId, LeaveRequestId, UserId) -> LeaveRequestCommand {
    let comment = body.and_then(|Json(b)| b.comment);
    move |tenant_id, request_id, acting_user| {
        command(DecideLeaveRequest {
            tenant_id,
            request_id,
            acting_user,
            comment,
            occurred_at: Utc::now(),
        })
    }
}

async fn approve_request(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult {
    run_request(&app, &scope, &id, decision(LeaveRequestCommand::Approve, body))
}

async fn deny_request(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult {
    run_request(&app, &scope, &id, decision(LeaveRequestCommand::Deny, body))
}

async fn reopen_request(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult {
    run_request(&app, &scope, &id, decision(LeaveRequestCommand::Reopen, body))
}
