use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use atelier_nocode::{EntityDraft, ModuleDraft};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::require;
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn nocode_router() -> Router {
    Router::new()
        .route("/modules", post(publish_module).get(list_modules))
        .route("/modules/:code/activate", post(activate_module))
        .route("/modules/:code/entities", post(define_entity))
        .route("/:module/:entity/records", post(create_record).get(list_records))
        .route(
            "/:module/:entity/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
}

fn record_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id("record"))
}

fn created(body: Value) -> ApiResult {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn publish_module(Extension(app): Extension<AppState>, scope: Scope, Json(draft): Json<ModuleDraft>) -> ApiResult {
    require(&scope, "nocode.write")?;
    let module = app.backend.nocode.publish_module(scope.tenant_id(), draft, Utc::now())?;
    created(json!(module))
}

/// Public catalogue shared by every tenant.
async fn list_modules(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "nocode.read")?;
    let modules = app.backend.nocode.list_public_modules();
    Ok(dto::items(modules.iter().map(|m| json!(m)).collect()))
}

async fn activate_module(Extension(app): Extension<AppState>, scope: Scope, Path(code): Path<String>) -> ApiResult {
    require(&scope, "nocode.write")?;
    app.backend.nocode.activate_for_tenant(scope.tenant_id(), &code)?;
    Ok(dto::ok(json!({ "code": code.trim().to_uppercase(), "active": true })))
}

async fn define_entity(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(code): Path<String>,
    Json(draft): Json<EntityDraft>,
) -> ApiResult {
    require(&scope, "nocode.write")?;
    let definition = app.backend.nocode.define_entity(scope.tenant_id(), &code, draft)?;
    created(json!(definition))
}

async fn create_record(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((module, entity)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult {
    require(&scope, "nocode.write")?;
    let record = app
        .backend
        .nocode
        .create_record(scope.tenant_id(), &module, &entity, payload, Utc::now())?;
    created(json!(record))
}

async fn list_records(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((module, entity)): Path<(String, String)>,
) -> ApiResult {
    require(&scope, "nocode.read")?;
    let records = app.backend.nocode.list_records(scope.tenant_id(), &module, &entity)?;
    Ok(dto::items(records.iter().map(|r| json!(r)).collect()))
}

async fn get_record(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((module, entity, id)): Path<(String, String, String)>,
) -> ApiResult {
    require(&scope, "nocode.read")?;
    let record = app
        .backend
        .nocode
        .get_record(scope.tenant_id(), &module, &entity, record_id(&id)?)?;
    Ok(dto::ok(json!(record)))
}

async fn update_record(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((module, entity, id)): Path<(String, String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult {
    require(&scope, "nocode.write")?;
    let record = app.backend.nocode.update_record(
        scope.tenant_id(),
        &module,
        &entity,
        record_id(&id)?,
        payload,
        Utc::now(),
    )?;
    Ok(dto::ok(json!(record)))
}

async fn delete_record(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path((module, entity, id)): Path<(String, String, String)>,
) -> ApiResult {
    require(&scope, "nocode.write")?;
    app.backend
        .nocode
        .delete_record(scope.tenant_id(), &module, &entity, record_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
