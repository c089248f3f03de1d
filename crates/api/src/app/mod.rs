//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request parsing helpers and JSON views of read models
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::Layer;
use tower::util::{MapRequest, MapRequestLayer};

use atelier_auth::Hs256JwtValidator;
use atelier_dolibarr::ImportOrchestrator;
use atelier_infra::{AppConfig, Backend, DispatchingImportSink};
use atelier_tenancy::ResolutionOptions;

use crate::middleware::{self, AuthState, TenantState};

pub mod dto;
pub mod errors;
pub mod routes;

/// Everything a handler can reach, shared through an `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub importer: Arc<ImportOrchestrator>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(backend: Backend, jwt_secret: &str) -> Self {
        let importer = ImportOrchestrator::new(
            Arc::new(DispatchingImportSink::new(backend.clone())),
            Arc::new(backend.import_runs.clone()),
        );
        Self {
            backend,
            importer: Arc::new(importer),
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    /// Swap the importer (tests point it at a fake Dolibarr).
    pub fn with_importer(mut self, importer: ImportOrchestrator) -> Self {
        self.importer = Arc::new(importer);
        self
    }
}

/// The router wrapped in the pre-routing tenant path rewrite.
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// Build the full HTTP app (public entrypoint used by `main.rs` and tests).
pub fn build_app(state: AppState, config: &AppConfig) -> App {
    let jwt = Arc::new(Hs256JwtValidator::new(state.jwt_secret.as_bytes()));
    let auth_state = AuthState { jwt };
    let tenant_state = TenantState {
        backend: state.backend.clone(),
        options: Arc::new(ResolutionOptions {
            base_domain: config.base_domain.clone(),
            fallback_to_first_active: config.default_tenant_fallback,
        }),
    };

    // Layers run bottom-up: auth, then tenant resolution, then per-module gates.
    let protected = routes::router(&state.backend)
        .layer(axum::middleware::from_fn_with_state(tenant_state, middleware::tenant_middleware))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .route("/tenants/signup", post(routes::tenants::signup))
        .merge(protected)
        .layer(Extension(state));

    MapRequestLayer::new(middleware::strip_tenant_prefix as fn(Request) -> Request).layer(router)
}

pub async fn serve(listener: TcpListener, app: App) -> std::io::Result<()> {
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await
}
