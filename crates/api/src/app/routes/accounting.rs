use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use atelier_accounting::{
    AccountType, DeactivateAccount, EntryLine, JournalEntry, LEDGER_AGGREGATE, Ledger, LedgerCommand, LedgerId,
    OpenAccount, OpenJournal, PostEntry, account_balance,
};
use atelier_core::{AggregateId, TenantId};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

pub fn accounting_router() -> Router {
    Router::new()
        .route("/accounts", post(open_account).get(list_accounts))
        .route("/accounts/:code/deactivate", post(deactivate_account))
        .route("/accounts/:code/balance", get(account_balance_handler))
        .route("/journals", post(open_journal).get(list_journals))
        .route("/entries", post(post_entry).get(list_entries))
}

fn make_ledger(id: AggregateId) -> Ledger {
    Ledger::empty(LedgerId::new(id))
}

/// One ledger per tenant; every accounting command targets it.
fn run_ledger(
    app: &AppState,
    scope: &Scope,
    build: impl FnOnce(TenantId, LedgerId) -> LedgerCommand,
) -> Result<usize, ApiError> {
    let t = scope.tenant_id();
    let ledger_id = LedgerId::for_tenant(t);
    let cmd = authorized(scope, build(t, ledger_id), "accounting.write")?;
    let committed = app.backend.execute(t, ledger_id.0, LEDGER_AGGREGATE, cmd, make_ledger)?;
    Ok(committed.len())
}

fn keyed(status: StatusCode, key: &str, value: &str, events_committed: usize) -> Response {
    (status, Json(json!({ key: value, "events_committed": events_committed }))).into_response()
}

#[derive(Debug, Deserialize)]
struct OpenAccountRequest {
    code: String,
    label: String,
    #[serde(default)]
    account_type: AccountType,
    parent_code: Option<String>,
}

async fn open_account(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<OpenAccountRequest>,
) -> ApiResult {
    let code = body.code.clone();
    let committed = run_ledger(&app, &scope, |tenant_id, ledger_id| {
        LedgerCommand::OpenAccount(OpenAccount {
            tenant_id,
            ledger_id,
            code: body.code,
            label: body.label,
            account_type: body.account_type,
            parent_code: body.parent_code,
            occurred_at: Utc::now(),
        })
    })?;
    Ok(keyed(StatusCode::CREATED, "code", &code.trim().to_uppercase(), committed))
}

#[derive(Debug, Deserialize)]
struct ListAccountsQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_accounts(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListAccountsQuery>,
) -> ApiResult {
    require(&scope, "accounting.read")?;
    let Some(ledger) = app.backend.read.ledger(scope.tenant_id()) else {
        return Ok(dto::items(Vec::new()));
    };
    let mut accounts: Vec<_> = ledger
        .accounts()
        .filter(|a| query.include_inactive || a.active)
        .collect();
    accounts.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(dto::items(accounts.into_iter().map(|a| json!(a)).collect()))
}

async fn deactivate_account(Extension(app): Extension<AppState>, scope: Scope, Path(code): Path<String>) -> ApiResult {
    let committed = run_ledger(&app, &scope, |tenant_id, ledger_id| {
        LedgerCommand::DeactivateAccount(DeactivateAccount {
            tenant_id,
            ledger_id,
            code: code.clone(),
            occurred_at: Utc::now(),
        })
    })?;
    Ok(keyed(StatusCode::OK, "code", &code.trim().to_uppercase(), committed))
}

#[derive(Debug, Deserialize)]
struct BalanceQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

/// Debit minus credit on one account, optionally bounded by entry date.
async fn account_balance_handler(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(code): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult {
    require(&scope, "accounting.read")?;
    let t = scope.tenant_id();
    let code = code.trim().to_uppercase();
    app.backend
        .read
        .ledger(t)
        .and_then(|l| l.account(&code).cloned())
        .ok_or_else(|| ApiError::not_found("account"))?;

    let entries = app.backend.read.journal_entries(t, None);
    let balance = account_balance(&entries, &code, query.from, query.to);
    Ok(dto::ok(json!({
        "code": code,
        "from": query.from,
        "to": query.to,
        "balance": balance,
    })))
}

#[derive(Debug, Deserialize)]
struct OpenJournalRequest {
    code: String,
    label: String,
}

async fn open_journal(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<OpenJournalRequest>,
) -> ApiResult {
    let code = body.code.clone();
    let committed = run_ledger(&app, &scope, |tenant_id, ledger_id| {
        LedgerCommand::OpenJournal(OpenJournal {
            tenant_id,
            ledger_id,
            code: body.code,
            label: body.label,
            occurred_at: Utc::now(),
        })
    })?;
    Ok(keyed(StatusCode::CREATED, "code", &code.trim().to_uppercase(), committed))
}

async fn list_journals(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "accounting.read")?;
    let journals = app
        .backend
        .read
        .ledger(scope.tenant_id())
        .map(|l| l.journals().map(|j| json!(j)).collect())
        .unwrap_or_default();
    Ok(dto::items(journals))
}

#[derive(Debug, Deserialize)]
struct PostEntryRequest {
    journal_code: String,
    entry_date: Option<NaiveDate>,
    reference: Option<String>,
    description: String,
    lines: Vec<EntryLine>,
}

async fn post_entry(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<PostEntryRequest>,
) -> ApiResult {
    let entry_id = AggregateId::new();
    let committed = run_ledger(&app, &scope, |tenant_id, ledger_id| {
        LedgerCommand::PostEntry(PostEntry {
            tenant_id,
            ledger_id,
            entry: JournalEntry {
                entry_id,
                journal_code: body.journal_code,
                entry_date: body.entry_date.unwrap_or_else(dto::today),
                reference: body.reference,
                description: body.description,
                lines: body.lines,
            },
            occurred_at: Utc::now(),
        })
    })?;
    Ok(dto::created(entry_id, committed))
}

#[derive(Debug, Deserialize)]
struct ListEntriesQuery {
    journal: Option<String>,
}

async fn list_entries(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListEntriesQuery>,
) -> ApiResult {
    require(&scope, "accounting.read")?;
    let journal = query.journal.map(|j| j.trim().to_uppercase());
    let entries = app.backend.read.journal_entries(scope.tenant_id(), journal.as_deref());
    Ok(dto::items(entries.iter().map(|e| json!(e)).collect()))
}
