use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use atelier_auth::{JwtClaims, PrincipalId, Role, mint_hs256};
use atelier_tenancy::{CoreModule, DictionaryType, NewDictionaryItem, RegisterTenant};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::require;
use crate::app::{AppState, dto};
use crate::context::Scope;

/// Lifetime of the owner token handed out at sign-up.
const SIGNUP_TOKEN_HOURS: i64 = 8;

pub fn tenant_router() -> Router {
    Router::new()
        .route("/modules", get(list_modules))
        .route("/modules/:code", put(set_module))
}

pub fn dictionary_router() -> Router {
    Router::new()
        .route("/:type", get(list_items).post(create_item))
        .route("/:type/:code", put(update_item).delete(delete_item))
}

/// Public: create a tenant and return an admin token for its first user.
pub async fn signup(Extension(app): Extension<AppState>, Json(body): Json<RegisterTenant>) -> ApiResult {
    let now = Utc::now();
    let tenant = app.backend.tenants.register(&body, now)?;

    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id: tenant.id,
        roles: vec![Role::new("admin")],
        issued_at: now,
        expires_at: now + Duration::hours(SIGNUP_TOKEN_HOURS),
    };
    let token = mint_hs256(app.jwt_secret.as_bytes(), &claims).map_err(|e| {
        error!(error = %e, "could not mint sign-up token");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "token_error", e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": tenant.id.to_string(),
            "code": tenant.code,
            "principal_id": claims.sub.to_string(),
            "token": token,
            "tenant": dto::tenant_view(&tenant),
        })),
    )
        .into_response())
}

async fn list_modules(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    let t = scope.tenant_id();
    let modules = CoreModule::ALL
        .into_iter()
        .map(|m| {
            json!({
                "code": m.code(),
                "enabled": app.backend.modules.is_enabled(t, m),
                "sort_order": m.sort_order(),
            })
        })
        .collect();
    Ok(dto::items(modules))
}

#[derive(Debug, Deserialize)]
struct SetModuleRequest {
    enabled: bool,
}

async fn set_module(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(code): Path<String>,
    Json(body): Json<SetModuleRequest>,
) -> ApiResult {
    require(&scope, "tenant.admin")?;
    let module = CoreModule::from_code(&code).ok_or_else(|| ApiError::not_found("module"))?;
    app.backend.modules.set_enabled(scope.tenant_id(), module, body.enabled)?;
    Ok(dto::ok(json!({ "code": module.code(), "enabled": body.enabled })))
}

fn dictionary_type(raw: &str) -> Result<DictionaryType, ApiError> {
    DictionaryType::from_code(raw).ok_or_else(|| ApiError::not_found("dictionary"))
}

#[derive(Debug, Deserialize)]
struct ListItemsQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_items(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(kind): Path<String>,
    Query(q): Query<ListItemsQuery>,
) -> ApiResult {
    require(&scope, "dictionaries.read")?;
    let items = app
        .backend
        .dictionaries
        .list(scope.tenant_id(), dictionary_type(&kind)?, q.include_inactive);
    Ok(dto::ok(json!({ "items": items })))
}

async fn create_item(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(kind): Path<String>,
    Json(body): Json<NewDictionaryItem>,
) -> ApiResult {
    require(&scope, "dictionaries.write")?;
    let item = app
        .backend
        .dictionaries
        .create(scope.tenant_id(), dictionary_type(&kind)?, &body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(json!(item))).into_response())
}

async fn update_item(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((kind, code)): Path<(String, String)>,
    Json(body): Json<NewDictionaryItem>,
) -> ApiResult {
    require(&scope, "dictionaries.write")?;
    let item = app
        .backend
        .dictionaries
        .update(scope.tenant_id(), dictionary_type(&kind)?, &code, &body, Utc::now())?;
    Ok(dto::ok(json!(item)))
}

async fn delete_item(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((kind, code)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require(&scope, "dictionaries.write")?;
    app.backend
        .dictionaries
        .delete(scope.tenant_id(), dictionary_type(&kind)?, &code)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
