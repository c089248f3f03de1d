use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use atelier_agenda::{
    AGENDA_EVENT_AGGREGATE, AgendaCommand, AgendaEvent, AgendaEventId, AgendaEventStatus, CloseEvent, EventDetails,
    InviteAttendee, RespondInvitation, ScheduleEvent, UpdateEvent, upcoming_until,
};
use atelier_core::{AggregateId, TenantId};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

const DEFAULT_UPCOMING_DAYS: u32 = 7;

pub fn agenda_router() -> Router {
    Router::new()
        .route("/events", post(schedule_event).get(list_events))
        .route("/upcoming", get(upcoming_events))
        .route("/events/:id", get(get_event).patch(update_event))
        .route("/events/:id/cancel", post(cancel_event))
        .route("/events/:id/complete", post(complete_event))
        .route("/events/:id/attendees", post(invite_attendee))
        .route("/events/:id/attendees/:user_id", put(respond_invitation))
}

fn make_event(id: AggregateId) -> AgendaEvent {
    AgendaEvent::empty(AgendaEventId::new(id))
}

/// Linked third party and contact must exist in the tenant.
fn check_links(app: &AppState, tenant_id: TenantId, details: &EventDetails) -> Result<(), ApiError> {
    if let Some(party) = details.third_party_id {
        app.backend
            .read
            .third_parties
            .get(tenant_id, party.0)
            .ok_or_else(|| ApiError::not_found("third party"))?;
    }
    if let Some(contact) = details.contact_id {
        app.backend
            .read
            .contacts
            .get(tenant_id, contact.0)
            .ok_or_else(|| ApiError::not_found("contact"))?;
    }
    Ok(())
}

async fn schedule_event(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(details): Json<EventDetails>,
) -> ApiResult {
    let t = scope.tenant_id();
    check_links(&app, t, &details)?;

    let id = AgendaEventId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        AgendaCommand::Schedule(ScheduleEvent {
            tenant_id: t,
            event_id: id,
            organizer: scope.user_id(),
            details,
            occurred_at: Utc::now(),
        }),
        "agenda.write",
    )?;
    let committed = app
        .backend
        .execute(t, id.0, AGENDA_EVENT_AGGREGATE, cmd, make_event)?;
    Ok(dto::created(id.0, committed.len()))
}

fn starts_within(event: &AgendaEvent, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    event
        .details()
        .is_some_and(|d| from.is_none_or(|f| d.start >= f) && to.is_none_or(|t| d.start <= t))
}

fn by_start(events: &mut [AgendaEvent]) {
    events.sort_by_key(|e| e.details().map(|d| d.start));
}

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    third_party_id: Option<String>,
}

async fn list_events(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult {
    require(&scope, "agenda.read")?;
    let party = query
        .third_party_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "third party"))
        .transpose()?;
    let mut found = app.backend.read.agenda.filter(scope.tenant_id(), |e| {
        starts_within(e, query.from, query.to)
            && party.is_none_or(|id| e.details().and_then(|d| d.third_party_id).is_some_and(|p| p.0 == id))
    });
    by_start(&mut found);
    Ok(dto::items(found.iter().map(dto::agenda_view).collect()))
}

#[derive(Debug, Deserialize)]
struct UpcomingQuery {
    days: Option<u32>,
}

/// Planned events starting between now and the end of day `now + days`.
async fn upcoming_events(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult {
    require(&scope, "agenda.read")?;
    let now = Utc::now();
    let until = upcoming_until(now, query.days.unwrap_or(DEFAULT_UPCOMING_DAYS));
    let mut found = app.backend.read.agenda.filter(scope.tenant_id(), |e| {
        e.status() == AgendaEventStatus::Planned && starts_within(e, Some(now), Some(until))
    });
    by_start(&mut found);
    Ok(dto::items(found.iter().map(dto::agenda_view).collect()))
}

async fn get_event(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "agenda.read")?;
    let id = dto::parse_id(&id, "event")?;
    let event = app
        .backend
        .read
        .agenda
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("event"))?;
    Ok(dto::ok(dto::agenda_view(&event)))
}

fn run_event(
    app: &AppState,
    scope: &Scope,
    id: &str,
    build: impl FnOnce(TenantId, AgendaEventId) -> AgendaCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = AgendaEventId::new(dto::parse_id(id, "event")?);
    let cmd = authorized(scope, build(t, id), "agenda.write")?;
    let committed = app
        .backend
        .execute(t, id.0, AGENDA_EVENT_AGGREGATE, cmd, make_event)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn update_event(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(details): Json<EventDetails>,
) -> ApiResult {
    check_links(&app, scope.tenant_id(), &details)?;
    run_event(&app, &scope, &id, |tenant_id, event_id| {
        AgendaCommand::Update(UpdateEvent {
            tenant_id,
            event_id,
            details,
            occurred_at: Utc::now(),
        })
    })
}

fn close(command: fn(CloseEvent) -> AgendaCommand) -> impl FnOnce(TenantId, AgendaEventId) -> AgendaCommand {
    move |tenant_id, event_id| {
        command(CloseEvent {
            tenant_id,
            event_id,
            occurred_at: Utc::now(),
        })
    }
}

async fn cancel_event(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_event(&app, &scope, &id, close(AgendaCommand::Cancel))
}

async fn complete_event(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    run_event(&app, &scope, &id, close(AgendaCommand::Complete))
}

#[derive(Debug, Deserialize)]
struct InviteRequest {
    user_id: String,
}

async fn invite_attendee(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<InviteRequest>,
) -> ApiResult {
    let user_id = dto::parse_user(&body.user_id)?;
    run_event(&app, &scope, &id, |tenant_id, event_id| {
        AgendaCommand::Invite(InviteAttendee {
            tenant_id,
            event_id,
            user_id,
            occurred_at: Utc::now(),
        })
    })
}

#[derive(Debug, Deserialize)]
struct ResponseRequest {
    accept: bool,
}

/// Attendees answer for themselves; admins may answer on their behalf.
async fn respond_invitation(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((id, user_id)): Path<(String, String)>,
    Json(body): Json<ResponseRequest>,
) -> ApiResult {
    let user_id = dto::parse_user(&user_id)?;
    if user_id != scope.user_id() {
        require(&scope, "tenant.admin")?;
    }
    run_event(&app, &scope, &id, |tenant_id, event_id| {
        AgendaCommand::Respond(RespondInvitation {
            tenant_id,
            event_id,
            user_id,
            accept: body.accept,
            occurred_at: Utc::now(),
        })
    })
}
