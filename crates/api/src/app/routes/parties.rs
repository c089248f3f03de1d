use axum::{
    extract::{Extension, Path, Query},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use atelier_core::numbering::next_reference;
use atelier_core::{AggregateId, AggregateRoot, TenantId};
use atelier_parties::{
    CONTACT_AGGREGATE, Contact, ContactCommand, ContactId, ContactProfile, CreateContact, DeleteContact,
    LinkThirdParty, RegisterThirdParty, THIRD_PARTY_AGGREGATE, ThirdParty, ThirdPartyCommand, ThirdPartyDetails,
    ThirdPartyId, ThirdPartyKind, ThirdPartyRef, UnlinkThirdParty, UpdateContact, UpdateThirdParty,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

const THIRD_PARTY_CODE_PREFIX: &str = "TP";
const DEFAULT_LINK_TYPE: &str = "CONTACT";

pub fn third_party_router() -> Router {
    Router::new()
        .route("/", post(register_third_party).get(list_third_parties))
        .route(
            "/:id",
            get(get_third_party).patch(update_third_party).delete(delete_third_party),
        )
        .route("/:id/deactivate", post(deactivate_third_party))
        .route("/:id/activate", post(activate_third_party))
}

pub fn contact_router() -> Router {
    Router::new()
        .route("/", post(create_contact).get(list_contacts))
        .route("/:id", get(get_contact).patch(update_contact).delete(delete_contact))
        .route("/:id/links", post(link_contact))
        .route("/:id/links/:third_party_id", delete(unlink_contact))
}

fn make_third_party(id: AggregateId) -> ThirdParty {
    ThirdParty::empty(ThirdPartyId::new(id))
}

fn make_contact(id: AggregateId) -> Contact {
    Contact::empty(ContactId::new(id))
}

/// The third party `raw` names, if it exists in the tenant and is not deleted.
pub(crate) fn existing_third_party(app: &AppState, tenant_id: TenantId, raw: &str) -> Result<ThirdParty, ApiError> {
    let id = dto::parse_id(raw, "third party")?;
    app.backend
        .read
        .third_parties
        .get(tenant_id, id)
        .filter(|t| !t.is_deleted())
        .ok_or_else(|| ApiError::not_found("third party"))
}

// -------------------------
// Third parties
// -------------------------

#[derive(Debug, Deserialize)]
struct RegisterThirdPartyRequest {
    code: Option<String>,
    name: String,
    #[serde(default)]
    customer: bool,
    #[serde(default)]
    supplier: bool,
    #[serde(default)]
    prospect: bool,
    #[serde(default)]
    details: ThirdPartyDetails,
    payment_terms_days: Option<u32>,
    credit_limit: Option<i64>,
}

async fn register_third_party(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<RegisterThirdPartyRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let code = match body.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
        Some(code) => {
            if app.backend.read.third_party_by_code(t, &code).is_some() {
                return Err(ApiError::conflict(format!("third party code {code} already exists")));
            }
            code
        }
        None => {
            let existing = app.backend.read.third_parties.list(t);
            next_reference(THIRD_PARTY_CODE_PREFIX, existing.iter().map(|p| p.code()))
        }
    };

    let id = ThirdPartyId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        ThirdPartyCommand::Register(RegisterThirdParty {
            tenant_id: t,
            third_party_id: id,
            code,
            name: body.name,
            customer: body.customer,
            supplier: body.supplier,
            prospect: body.prospect,
            details: body.details,
            payment_terms_days: body.payment_terms_days,
            credit_limit: body.credit_limit,
            occurred_at: Utc::now(),
        }),
        "parties.write",
    )?;

    let committed = app
        .backend
        .execute(t, id.0, THIRD_PARTY_AGGREGATE, cmd, make_third_party)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListThirdPartiesQuery {
    q: Option<String>,
    kind: Option<String>,
}

async fn list_third_parties(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListThirdPartiesQuery>,
) -> ApiResult {
    require(&scope, "parties.read")?;
    let kind = match query.kind.as_deref() {
        Some(raw) => Some(ThirdPartyKind::parse(raw).ok_or_else(|| ApiError::bad_request(format!("invalid kind: {raw}")))?),
        None => None,
    };
    let q = query.q.unwrap_or_default();

    let mut found = app.backend.read.third_parties.filter(scope.tenant_id(), |p| {
        !p.is_deleted()
            && kind.is_none_or(|k| p.kind().includes(k))
            && (q.is_empty() || dto::contains_ci(p.name(), &q) || dto::contains_ci(p.code(), &q))
    });
    found.sort_by(|a, b| a.name().to_lowercase().cmp(&b.name().to_lowercase()));
    Ok(dto::items(found.iter().map(dto::third_party_view).collect()))
}

async fn get_third_party(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "parties.read")?;
    let party = existing_third_party(&app, scope.tenant_id(), &id)?;
    Ok(dto::ok(dto::third_party_view(&party)))
}

#[derive(Debug, Deserialize)]
struct UpdateThirdPartyRequest {
    name: Option<String>,
    customer: Option<bool>,
    supplier: Option<bool>,
    prospect: Option<bool>,
    details: Option<ThirdPartyDetails>,
    payment_terms_days: Option<u32>,
    credit_limit: Option<i64>,
}

async fn update_third_party(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<UpdateThirdPartyRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ThirdPartyId::new(dto::parse_id(&id, "third party")?);
    let cmd = authorized(
        &scope,
        ThirdPartyCommand::Update(UpdateThirdParty {
            tenant_id: t,
            third_party_id: id,
            name: body.name,
            customer: body.customer,
            supplier: body.supplier,
            prospect: body.prospect,
            details: body.details,
            payment_terms_days: body.payment_terms_days,
            credit_limit: body.credit_limit,
            occurred_at: Utc::now(),
        }),
        "parties.write",
    )?;
    let committed = app
        .backend
        .execute(t, id.0, THIRD_PARTY_AGGREGATE, cmd, make_third_party)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn third_party_status(
    app: AppState,
    scope: Scope,
    id: String,
    command: fn(ThirdPartyRef) -> ThirdPartyCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ThirdPartyId::new(dto::parse_id(&id, "third party")?);
    let cmd = authorized(
        &scope,
        command(ThirdPartyRef {
            tenant_id: t,
            third_party_id: id,
            occurred_at: Utc::now(),
        }),
        "parties.write",
    )?;
    let committed = app
        .backend
        .execute(t, id.0, THIRD_PARTY_AGGREGATE, cmd, make_third_party)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn deactivate_third_party(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    third_party_status(app, scope, id, ThirdPartyCommand::Deactivate).await
}

async fn activate_third_party(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    third_party_status(app, scope, id, ThirdPartyCommand::Activate).await
}

async fn delete_third_party(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    third_party_status(app, scope, id, ThirdPartyCommand::Delete).await
}

// -------------------------
// Contacts
// -------------------------

#[derive(Debug, Deserialize)]
struct CreateContactRequest {
    #[serde(flatten)]
    profile: ContactProfile,
    #[serde(default)]
    primary: bool,
    third_party_id: Option<String>,
    link_type: Option<String>,
}

async fn create_contact(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateContactRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let party = match body.third_party_id.as_deref() {
        Some(raw) => Some(existing_third_party(&app, t, raw)?),
        None => None,
    };

    let id = ContactId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        ContactCommand::Create(CreateContact {
            tenant_id: t,
            contact_id: id,
            profile: body.profile,
            primary: body.primary,
            occurred_at: Utc::now(),
        }),
        "contacts.write",
    )?;
    let mut committed = app.backend.execute(t, id.0, CONTACT_AGGREGATE, cmd, make_contact)?.len();

    if let Some(party) = party {
        let link = ContactCommand::Link(LinkThirdParty {
            tenant_id: t,
            contact_id: id,
            third_party_id: *party.id(),
            link_type: body.link_type.unwrap_or_else(|| DEFAULT_LINK_TYPE.to_string()),
            occurred_at: Utc::now(),
        });
        committed += app.backend.execute(t, id.0, CONTACT_AGGREGATE, link, make_contact)?.len();
    }
    Ok(dto::created(id.0, committed))
}

#[derive(Debug, Deserialize)]
struct ListContactsQuery {
    third_party_id: Option<String>,
    q: Option<String>,
}

async fn list_contacts(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListContactsQuery>,
) -> ApiResult {
    require(&scope, "contacts.read")?;
    let party = match query.third_party_id.as_deref() {
        Some(raw) => Some(ThirdPartyId::new(dto::parse_id(raw, "third party")?)),
        None => None,
    };
    let q = query.q.unwrap_or_default();

    let mut found = app.backend.read.contacts.filter(scope.tenant_id(), |c| {
        !c.is_deleted()
            && party.is_none_or(|p| c.links().iter().any(|l| l.third_party_id == p))
            && (q.is_empty() || dto::contains_ci(&c.profile().display_name(), &q))
    });
    found.sort_by_key(|c| c.profile().display_name().to_lowercase());
    Ok(dto::items(found.iter().map(dto::contact_view).collect()))
}

async fn get_contact(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "contacts.read")?;
    let id = dto::parse_id(&id, "contact")?;
    let contact = app
        .backend
        .read
        .contacts
        .get(scope.tenant_id(), id)
        .filter(|c| !c.is_deleted())
        .ok_or_else(|| ApiError::not_found("contact"))?;
    Ok(dto::ok(dto::contact_view(&contact)))
}

#[derive(Debug, Deserialize)]
struct UpdateContactRequest {
    #[serde(flatten)]
    profile: ContactProfile,
    primary: Option<bool>,
}

async fn update_contact(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<UpdateContactRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContactId::new(dto::parse_id(&id, "contact")?);
    let cmd = authorized(
        &scope,
        ContactCommand::Update(UpdateContact {
            tenant_id: t,
            contact_id: id,
            profile: body.profile,
            primary: body.primary,
            occurred_at: Utc::now(),
        }),
        "contacts.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTACT_AGGREGATE, cmd, make_contact)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn delete_contact(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContactId::new(dto::parse_id(&id, "contact")?);
    let cmd = authorized(
        &scope,
        ContactCommand::Delete(DeleteContact {
            tenant_id: t,
            contact_id: id,
            occurred_at: Utc::now(),
        }),
        "contacts.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTACT_AGGREGATE, cmd, make_contact)?;
    Ok(dto::applied(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct LinkRequest {
    third_party_id: String,
    link_type: Option<String>,
}

async fn link_contact(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<LinkRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContactId::new(dto::parse_id(&id, "contact")?);
    let party = existing_third_party(&app, t, &body.third_party_id)?;
    let cmd = authorized(
        &scope,
        ContactCommand::Link(LinkThirdParty {
            tenant_id: t,
            contact_id: id,
            third_party_id: *party.id(),
            link_type: body.link_type.unwrap_or_else(|| DEFAULT_LINK_TYPE.to_string()),
            occurred_at: Utc::now(),
        }),
        "contacts.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTACT_AGGREGATE, cmd, make_contact)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn unlink_contact(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((id, third_party_id)): Path<(String, String)>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContactId::new(dto::parse_id(&id, "contact")?);
    let party = ThirdPartyId::new(dto::parse_id(&third_party_id, "third party")?);
    let cmd = authorized(
        &scope,
        ContactCommand::Unlink(UnlinkThirdParty {
            tenant_id: t,
            contact_id: id,
            third_party_id: party,
            occurred_at: Utc::now(),
        }),
        "contacts.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTACT_AGGREGATE, cmd, make_contact)?;
    Ok(dto::applied(id.0, committed.len()))
}
