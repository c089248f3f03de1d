use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use atelier_dolibarr::{ImportConfig, RunStore};
use atelier_core::TenantId;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::require;
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn import_router() -> Router {
    Router::new()
        .route("/config", put(save_config).get(get_config))
        .route("/test", post(test_connection))
        .route("/runs", post(start_run).get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/runs/:id/logs", get(run_logs))
        .route("/runs/:id/staging", get(run_staging))
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    base_url: String,
    api_key: String,
}

async fn save_config(Extension(app): Extension<AppState>, scope: Scope, Json(body): Json<ConfigRequest>) -> ApiResult {
    require(&scope, "import.config")?;
    let base_url = body.base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
        return Err(ApiError::bad_request("base_url is required"));
    }
    let config = ImportConfig {
        id: Uuid::now_v7(),
        base_url,
        api_key: body.api_key,
    };
    app.backend.import_runs.save_config(scope.tenant_id(), config.clone())?;
    Ok(dto::ok(dto::import_config_view(&config)))
}

fn stored_config(app: &AppState, tenant_id: TenantId) -> Result<ImportConfig, ApiError> {
    app.backend
        .import_runs
        .config(tenant_id)
        .ok_or_else(|| ApiError::not_found("import configuration"))
}

async fn get_config(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "import.config")?;
    let config = stored_config(&app, scope.tenant_id())?;
    Ok(dto::ok(dto::import_config_view(&config)))
}

async fn test_connection(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "import.config")?;
    let config = stored_config(&app, scope.tenant_id())?;
    app.importer.test_connection(&config).await?;
    Ok(dto::ok(json!({ "connected": true, "base_url": config.base_url })))
}

/// Runs the whole import before answering; step failures land in the run log.
async fn start_run(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "import.run")?;
    let t = scope.tenant_id();
    let config = stored_config(&app, t)?;
    let run = app.importer.run_import(t, &config, Some(scope.user_id())).await?;
    info!(tenant_id = %t, run_id = %run.id, "import run recorded");
    Ok((StatusCode::CREATED, Json(dto::import_run_view(&run))).into_response())
}

async fn list_runs(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "import.read")?;
    let runs = app.backend.import_runs.list_runs(scope.tenant_id());
    Ok(dto::items(runs.iter().map(dto::import_run_view).collect()))
}

fn run_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id("import run"))
}

fn existing_run(app: &AppState, tenant_id: TenantId, raw: &str) -> Result<Uuid, ApiError> {
    let id = run_id(raw)?;
    app.backend
        .import_runs
        .get_run(tenant_id, id)
        .map(|r| r.id)
        .ok_or_else(|| ApiError::not_found("import run"))
}

async fn get_run(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "import.read")?;
    let run = app
        .backend
        .import_runs
        .get_run(scope.tenant_id(), run_id(&id)?)
        .ok_or_else(|| ApiError::not_found("import run"))?;
    Ok(dto::ok(dto::import_run_view(&run)))
}

async fn run_logs(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "import.read")?;
    let t = scope.tenant_id();
    let id = existing_run(&app, t, &id)?;
    let logs = app.backend.import_runs.logs(t, id);
    Ok(dto::items(logs.iter().map(|l| json!(l)).collect()))
}

/// Raw Dolibarr payloads kept for resources with no local counterpart.
async fn run_staging(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "import.read")?;
    let t = scope.tenant_id();
    let id = existing_run(&app, t, &id)?;
    let records = app.backend.import_runs.staging(t, id);
    Ok(dto::items(records.iter().map(|r| json!(r)).collect()))
}
