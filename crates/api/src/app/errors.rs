use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use atelier_auth::AuthzError;
use atelier_core::DomainError;
use atelier_dolibarr::ImportError;
use atelier_ged::StorageError;
use atelier_infra::command_dispatcher::DispatchError;
use atelier_infra::records::RecordError;
use atelier_nocode::NocodeError;
use atelier_tenancy::TenantContextError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Deserialize(msg) => {
            error!(%msg, "stored event could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

fn tenant_context_to_response(err: TenantContextError) -> Response {
    match err {
        TenantContextError::Missing => json_error(StatusCode::BAD_REQUEST, "tenant_required", err.to_string()),
        TenantContextError::Mismatch { .. } => json_error(StatusCode::FORBIDDEN, "tenant_mismatch", err.to_string()),
    }
}

fn store_failure(msg: String) -> Response {
    error!(%msg, "record write failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
}

pub fn record_error_to_response(err: RecordError) -> Response {
    match err {
        RecordError::Domain(e) => domain_error_to_response(e),
        RecordError::Tenant(e) => tenant_context_to_response(e),
        RecordError::Store(msg) => store_failure(msg),
    }
}

pub fn nocode_error_to_response(err: NocodeError) -> Response {
    match err {
        NocodeError::Domain(e) => domain_error_to_response(e),
        NocodeError::TenantMismatch => json_error(StatusCode::FORBIDDEN, "tenant_mismatch", err.to_string()),
        NocodeError::ModuleNotFound(_) | NocodeError::EntityNotFound { .. } | NocodeError::RecordNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        NocodeError::Storage(msg) => store_failure(msg),
    }
}

pub fn import_error_to_response(err: ImportError) -> Response {
    match err {
        ImportError::Config(msg) => json_error(StatusCode::BAD_REQUEST, "import_config", msg),
        ImportError::Source(e) => json_error(StatusCode::BAD_GATEWAY, "dolibarr_unreachable", e.to_string()),
        ImportError::Domain(e) => domain_error_to_response(e),
        ImportError::Tenant(e) => tenant_context_to_response(e),
        ImportError::Sink(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "import_failed", msg),
        ImportError::Store(msg) => store_failure(msg),
    }
}

pub fn storage_error_to_response(err: StorageError) -> Response {
    match err {
        StorageError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StorageError::InvalidKey(_) => json_error(StatusCode::BAD_REQUEST, "invalid_key", err.to_string()),
        StorageError::Io(e) => {
            error!(error = %e, "document storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
        }
    }
}

/// Error half of every handler result; each layer's error converts into it so
/// handlers can use `?`.
#[derive(Debug)]
pub struct ApiError(Response);

pub type ApiResult = Result<Response, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self(json_error(status, code, message))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn invalid_id(what: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0
    }
}

impl From<Response> for ApiError {
    fn from(value: Response) -> Self {
        Self(value)
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        Self(dispatch_error_to_response(value))
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(domain_error_to_response(value))
    }
}

impl From<RecordError> for ApiError {
    fn from(value: RecordError) -> Self {
        Self(record_error_to_response(value))
    }
}

impl From<NocodeError> for ApiError {
    fn from(value: NocodeError) -> Self {
        Self(nocode_error_to_response(value))
    }
}

impl From<ImportError> for ApiError {
    fn from(value: ImportError) -> Self {
        Self(import_error_to_response(value))
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        Self(storage_error_to_response(value))
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invariant("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::Unauthorized, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn missing_record_context_is_a_bad_request() {
        let res = record_error_to_response(RecordError::Tenant(TenantContextError::Missing));
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn failed_record_writes_are_server_errors() {
        let res = record_error_to_response(RecordError::Store("tenants upsert: connection refused".to_string()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = nocode_error_to_response(NocodeError::Storage("nocode_records upsert".to_string()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = import_error_to_response(ImportError::Store("import_configs upsert".to_string()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn nocode_lookups_are_not_found() {
        let res = nocode_error_to_response(NocodeError::EntityNotFound {
            module: "crm".to_string(),
            entity: "lead".to_string(),
        });
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
