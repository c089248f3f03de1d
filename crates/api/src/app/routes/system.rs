use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::context::Scope;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(scope: Scope) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": scope.tenant.tenant_id().to_string(),
        "tenant_source": format!("{:?}", scope.tenant.source()).to_lowercase(),
        "principal_id": scope.principal.principal_id().to_string(),
        "roles": scope.principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}
