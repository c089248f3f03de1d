use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Path, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, warn};

use atelier_core::{AggregateId, AggregateRoot, TenantId};
use atelier_ged::{
    DOCUMENT_AGGREGATE, DeleteDocument, Document, DocumentCommand, DocumentId, DocumentMeta, DocumentStorage,
    EntityRef, StorageError, UploadDocument, sanitize_file_name, storage_key,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn ged_router() -> Router {
    Router::new()
        .route("/documents", post(upload_document).get(list_documents))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/documents/:id/content", get(download_document))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn make_document(id: AggregateId) -> Document {
    Document::empty(DocumentId::new(id))
}

/// Blob storage is synchronous file I/O; keep it off the async workers.
async fn on_storage<T, F>(app: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&dyn DocumentStorage) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let storage = app.backend.documents.clone();
    match tokio::task::spawn_blocking(move || op(storage.as_ref())).await {
        Ok(result) => Ok(result?),
        Err(err) => {
            error!(error = %err, "document storage task failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "document storage task failed",
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    entity_type: String,
    entity_id: String,
    file_name: String,
}

/// Store the blob, then record the document. A failed dispatch removes the blob again.
async fn upload_document(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let t = scope.tenant_id();
    require(&scope, "ged.write")?;
    if body.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }

    let entity = EntityRef::new(&query.entity_type, &query.entity_id)?;
    let file_name = sanitize_file_name(&query.file_name);
    let previous = app.backend.read.documents.filter(t, |d| {
        d.meta()
            .is_some_and(|m| m.entity == entity && m.file_name == file_name)
    });
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let id = DocumentId::new(AggregateId::new());
    let key = storage_key(t, id.0, &file_name);
    let cmd = authorized(
        &scope,
        DocumentCommand::Upload(UploadDocument {
            tenant_id: t,
            document_id: id,
            meta: DocumentMeta {
                entity,
                file_name,
                storage_key: key.clone(),
                mime_type,
                size: body.len() as u64,
                version: previous.len() as u32 + 1,
                uploaded_by: Some(scope.user_id()),
            },
            occurred_at: Utc::now(),
        }),
        "ged.write",
    )?;

    let blob_key = key.clone();
    on_storage(&app, move |s| s.put(&blob_key, &body)).await?;
    match app.backend.execute(t, id.0, DOCUMENT_AGGREGATE, cmd, make_document) {
        Ok(committed) => Ok(dto::created(id.0, committed.len())),
        Err(err) => {
            let blob_key = key.clone();
            if let Err(cleanup) = on_storage(&app, move |s| s.delete(&blob_key)).await {
                warn!(key = %key, error = ?cleanup, "orphan blob left after failed upload");
            }
            Err(err.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListDocumentsQuery {
    entity_type: Option<String>,
    entity_id: Option<String>,
    q: Option<String>,
}

async fn list_documents(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult {
    require(&scope, "ged.read")?;
    let entity_type = query.entity_type.map(|e| e.trim().to_lowercase());
    let entity_id = query.entity_id.map(|e| e.trim().to_string());
    let q = query.q.unwrap_or_default();

    let mut found = app.backend.read.documents.filter(scope.tenant_id(), |d| {
        !d.is_deleted()
            && d.meta().is_some_and(|m| {
                entity_type.as_deref().is_none_or(|e| m.entity.entity_type == e)
                    && entity_id.as_deref().is_none_or(|e| m.entity.entity_id == e)
                    && (q.is_empty() || dto::contains_ci(&m.file_name, &q))
            })
    });
    found.sort_by(|a, b| {
        let key = |d: &Document| d.meta().map(|m| (m.file_name.clone(), m.version));
        match (key(a), key(b)) {
            (Some((an, av)), Some((bn, bv))) => an.cmp(&bn).then(bv.cmp(&av)),
            (ka, kb) => ka.cmp(&kb),
        }
    });
    Ok(dto::items(found.iter().map(dto::document_view).collect()))
}

fn live_document(app: &AppState, tenant_id: TenantId, raw: &str) -> Result<(Document, DocumentMeta), ApiError> {
    let id = dto::parse_id(raw, "document")?;
    let document = app
        .backend
        .read
        .documents
        .get(tenant_id, id)
        .filter(|d| !d.is_deleted())
        .ok_or_else(|| ApiError::not_found("document"))?;
    let meta = document.meta().cloned().ok_or_else(|| ApiError::not_found("document"))?;
    Ok((document, meta))
}

async fn get_document(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "ged.read")?;
    let (document, _) = live_document(&app, scope.tenant_id(), &id)?;
    Ok(dto::ok(dto::document_view(&document)))
}

async fn download_document(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "ged.read")?;
    let (_, meta) = live_document(&app, scope.tenant_id(), &id)?;
    let key = meta.storage_key.clone();
    let content = on_storage(&app, move |s| s.get(&key)).await?;

    let content_type = meta
        .mime_type
        .as_deref()
        .and_then(|m| HeaderValue::from_str(m).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", meta.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        content,
    )
        .into_response())
}

/// Delete the document, then its blob. A missing blob is not an error.
async fn delete_document(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "ged.write")?;
    let t = scope.tenant_id();
    let (document, meta) = live_document(&app, t, &id)?;
    let document_id = *document.id();
    let cmd = authorized(
        &scope,
        DocumentCommand::Delete(DeleteDocument {
            tenant_id: t,
            document_id,
            occurred_at: Utc::now(),
        }),
        "ged.write",
    )?;
    let committed = app
        .backend
        .execute(t, document_id.0, DOCUMENT_AGGREGATE, cmd, make_document)?;
    on_storage(&app, move |s| s.delete(&meta.storage_key)).await?;
    Ok(dto::applied(document_id.0, committed.len()))
}
