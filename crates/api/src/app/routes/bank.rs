use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use atelier_bank::{
    BANK_ACCOUNT_AGGREGATE, BankAccount, BankAccountCommand, BankAccountId, CloseBankAccount, Movement,
    OpenBankAccount, RecordMovement,
};
use atelier_core::{AggregateId, AggregateRoot};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn bank_router() -> Router {
    Router::new()
        .route("/accounts", post(open_account).get(list_accounts))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/movements", post(record_movement).get(list_movements))
        .route("/accounts/:id/close", post(close_account))
}

fn make_account(id: AggregateId) -> BankAccount {
    BankAccount::empty(BankAccountId::new(id))
}

#[derive(Debug, Deserialize)]
struct OpenAccountRequest {
    name: String,
    iban: Option<String>,
    bic: Option<String>,
    currency: Option<String>,
}

async fn open_account(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<OpenAccountRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = BankAccountId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        BankAccountCommand::Open(OpenBankAccount {
            tenant_id: t,
            account_id: id,
            name: body.name,
            iban: body.iban,
            bic: body.bic,
            currency: body.currency,
            occurred_at: Utc::now(),
        }),
        "bank.write",
    )?;
    let committed = app.backend.execute(t, id.0, BANK_ACCOUNT_AGGREGATE, cmd, make_account)?;
    Ok(dto::created(id.0, committed.len()))
}

async fn list_accounts(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "bank.read")?;
    let mut accounts = app.backend.read.bank_accounts.list(scope.tenant_id());
    accounts.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(dto::items(accounts.iter().map(dto::bank_account_view).collect()))
}

fn load_account(app: &AppState, scope: &Scope, raw: &str) -> Result<BankAccount, ApiError> {
    let id = dto::parse_id(raw, "bank account")?;
    app.backend
        .read
        .bank_accounts
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("bank account"))
}

async fn get_account(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "bank.read")?;
    let account = load_account(&app, &scope, &id)?;
    Ok(dto::ok(dto::bank_account_view(&account)))
}

#[derive(Debug, Deserialize)]
struct MovementRequest {
    value_date: Option<NaiveDate>,
    amount: i64,
    description: String,
    reference: Option<String>,
}

/// Manual movement: positive amounts are credits to the account.
async fn record_movement(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(body): Json<MovementRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    let account_id = BankAccountId::new(dto::parse_id(&id, "bank account")?);
    let movement_id = AggregateId::new();
    let cmd = authorized(
        &scope,
        BankAccountCommand::RecordMovement(RecordMovement {
            tenant_id: t,
            account_id,
            movement: Movement {
                movement_id,
                value_date: body.value_date.unwrap_or_else(dto::today),
                amount: body.amount,
                description: body.description,
                reference: body.reference,
                payment_id: None,
                invoice_id: None,
            },
            occurred_at: Utc::now(),
        }),
        "bank.write",
    )?;
    let committed = app
        .backend
        .execute(t, account_id.0, BANK_ACCOUNT_AGGREGATE, cmd, make_account)?;
    Ok(dto::created(movement_id, committed.len()))
}

async fn list_movements(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "bank.read")?;
    let account = load_account(&app, &scope, &id)?;
    let movements = app.backend.read.account_movements(scope.tenant_id(), *account.id());
    Ok(dto::items(movements.iter().map(dto::movement_view).collect()))
}

async fn close_account(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    let t = scope.tenant_id();
    let account_id = BankAccountId::new(dto::parse_id(&id, "bank account")?);
    let cmd = authorized(
        &scope,
        BankAccountCommand::Close(CloseBankAccount {
            tenant_id: t,
            account_id,
            occurred_at: Utc::now(),
        }),
        "bank.write",
    )?;
    let committed = app
        .backend
        .execute(t, account_id.0, BANK_ACCOUNT_AGGREGATE, cmd, make_account)?;
    Ok(dto::applied(account_id.0, committed.len()))
}
