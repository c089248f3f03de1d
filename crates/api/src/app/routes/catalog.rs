use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use atelier_catalog::{
    CATEGORY_AGGREGATE, Category, CategoryCommand, CategoryId, CreateCategory, CreateProduct, PRODUCT_AGGREGATE,
    Product, ProductActivation, ProductCommand, ProductId, ProductProfile, UpdateProduct,
};
use atelier_core::AggregateId;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn product_router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).patch(update_product))
        .route("/:id/deactivate", post(deactivate_product))
        .route("/:id/reactivate", post(reactivate_product))
}

pub fn category_router() -> Router {
    Router::new().route("/", post(create_category).get(list_categories))
}

fn make_product(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

#[derive(Debug, Deserialize)]
struct CreateProductRequest {
    code: String,
    #[serde(flatten)]
    profile: ProductProfile,
}

async fn create_product(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateProductRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    if app.backend.read.product_by_code(t, body.code.trim()).is_some() {
        return Err(ApiError::conflict(format!("product code {} already exists", body.code.trim())));
    }
    if let Some(category) = body.profile.category_id {
        app.backend
            .read
            .categories
            .get(t, category.0)
            .ok_or_else(|| ApiError::not_found("category"))?;
    }

    let id = ProductId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        ProductCommand::Create(CreateProduct {
            tenant_id: t,
            product_id: id,
            code: body.code,
            profile: body.profile,
            occurred_at: Utc::now(),
        }),
        "products.write",
    )?;
    let committed = app.backend.execute(t, id.0, PRODUCT_AGGREGATE, cmd, make_product)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListProductsQuery {
    q: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

async fn list_products(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult {
    require(&scope, "products.read")?;
    let q = query.q.unwrap_or_default();
    let mut found = app.backend.read.products.filter(scope.tenant_id(), |p| {
        (query.include_inactive || p.is_active())
            && (q.is_empty()
                || dto::contains_ci(p.code(), &q)
                || p.profile().is_some_and(|pr| dto::contains_ci(&pr.name, &q)))
    });
    found.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(dto::items(found.iter().map(dto::product_view).collect()))
}

async fn get_product(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "products.read")?;
    let id = dto::parse_id(&id, "product")?;
    let product = app
        .backend
        .read
        .products
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("product"))?;
    Ok(dto::ok(dto::product_view(&product)))
}

async fn update_product(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(profile): Json<ProductProfile>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ProductId::new(dto::parse_id(&id, "product")?);
    let cmd = authorized(
        &scope,
        ProductCommand::Update(UpdateProduct {
            tenant_id: t,
            product_id: id,
            profile,
            occurred_at: Utc::now(),
        }),
        "products.write",
    )?;
    let committed = app.backend.execute(t, id.0, PRODUCT_AGGREGATE, cmd, make_product)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn product_activation(
    app: AppState,
    scope: Scope,
    id: String,
    command: fn(ProductActivation) -> ProductCommand,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ProductId::new(dto::parse_id(&id, "product")?);
    let cmd = authorized(
        &scope,
        command(ProductActivation {
            tenant_id: t,
            product_id: id,
            occurred_at: Utc::now(),
        }),
        "products.write",
    )?;
    let committed = app.backend.execute(t, id.0, PRODUCT_AGGREGATE, cmd, make_product)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn deactivate_product(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    product_activation(app, scope, id, ProductCommand::Deactivate).await
}

async fn reactivate_product(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    product_activation(app, scope, id, ProductCommand::Reactivate).await
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    code: String,
    label: String,
    parent_id: Option<String>,
}

async fn create_category(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<CreateCategoryRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    if app.backend.read.category_by_code(t, body.code.trim()).is_some() {
        return Err(ApiError::conflict(format!("category code {} already exists", body.code.trim())));
    }
    let parent_id = match body.parent_id.as_deref() {
        Some(raw) => {
            let parent = dto::parse_id(raw, "category")?;
            app.backend
                .read
                .categories
                .get(t, parent)
                .ok_or_else(|| ApiError::not_found("parent category"))?;
            Some(CategoryId::new(parent))
        }
        None => None,
    };

    let id = CategoryId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        CategoryCommand::Create(CreateCategory {
            tenant_id: t,
            category_id: id,
            code: body.code,
            label: body.label,
            parent_id,
            occurred_at: Utc::now(),
        }),
        "products.write",
    )?;
    let committed = app
        .backend
        .execute(t, id.0, CATEGORY_AGGREGATE, cmd, |a| Category::empty(CategoryId::new(a)))?;
    Ok(dto::created(id.0, committed.len()))
}

async fn list_categories(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "products.read")?;
    let mut categories = app.backend.read.categories.list(scope.tenant_id());
    categories.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(dto::items(categories.iter().map(dto::category_view).collect()))
}
