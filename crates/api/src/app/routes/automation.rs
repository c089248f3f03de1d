use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use atelier_automation::{Outbox, RuleDraft};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::require;
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn automation_router() -> Router {
    Router::new()
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/:id", get(get_rule).put(update_rule).delete(delete_rule))
        .route("/outbox", get(list_outbox))
}

fn rule_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id("rule"))
}

async fn create_rule(Extension(app): Extension<AppState>, scope: Scope, Json(draft): Json<RuleDraft>) -> ApiResult {
    require(&scope, "automation.write")?;
    let rule = app.backend.rules.create(scope.tenant_id(), draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(json!(rule))).into_response())
}

async fn list_rules(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "automation.read")?;
    let rules = app.backend.rules.list(scope.tenant_id());
    Ok(dto::items(rules.iter().map(|r| json!(r)).collect()))
}

async fn get_rule(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "automation.read")?;
    let rule = app
        .backend
        .rules
        .get(scope.tenant_id(), rule_id(&id)?)
        .ok_or_else(|| ApiError::not_found("rule"))?;
    Ok(dto::ok(json!(rule)))
}

async fn update_rule(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult {
    require(&scope, "automation.write")?;
    let rule = app
        .backend
        .rules
        .update(scope.tenant_id(), rule_id(&id)?, draft, Utc::now())?;
    Ok(dto::ok(json!(rule)))
}

async fn delete_rule(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "automation.write")?;
    app.backend.rules.delete(scope.tenant_id(), rule_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Mail queued by `send_email` rules, oldest first.
async fn list_outbox(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "automation.read")?;
    let emails = app.backend.outbox.list(scope.tenant_id());
    Ok(dto::items(emails.iter().map(|e| json!(e)).collect()))
}
