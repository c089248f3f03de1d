use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use atelier_core::numbering::next_reference;
use atelier_core::{AggregateId, TenantId};
use atelier_hr::{
    ActivateContract, CONTRACT_AGGREGATE, Contract, ContractCommand, ContractId, ContractTerms, DraftContract,
    EMPLOYEE_AGGREGATE, Employee, EmployeeCommand, EmployeeId, EmployeeProfile, EmployeeStatus, EndContract,
    HireEmployee, JobPosition, LeaveType, TerminateEmployee, UpdateEmployee,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, require};
use crate::app::{AppState, dto};
use crate::context::Scope;

const EMPLOYEE_NUMBER_PREFIX: &str = "EMP";

pub fn hr_router() -> Router {
    Router::new()
        .route("/positions", post(save_position).get(list_positions))
        .route("/leave-types", post(save_leave_type).get(list_leave_types))
        .route("/leave-validators/:user_id", put(set_leave_validator).get(get_leave_validator))
        .route("/employees", post(hire_employee).get(list_employees))
        .route("/employees/:id", get(get_employee).patch(update_employee))
        .route("/employees/:id/terminate", post(terminate_employee))
        .route("/contracts", post(draft_contract).get(list_contracts))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/activate", post(activate_contract))
        .route("/contracts/:id/end", post(end_contract))
}

fn make_employee(id: AggregateId) -> Employee {
    Employee::empty(EmployeeId::new(id))
}

fn make_contract(id: AggregateId) -> Contract {
    Contract::empty(ContractId::new(id))
}

// -------------------------
// Reference data
// -------------------------

#[derive(Debug, Deserialize)]
struct PositionRequest {
    code: String,
    title: String,
    department: Option<String>,
}

async fn save_position(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<PositionRequest>,
) -> ApiResult {
    require(&scope, "hr.write")?;
    let position = JobPosition::new(&body.code, &body.title, body.department.as_deref())?;
    app.backend
        .hr
        .save_position(scope.tenant_id(), position.clone(), Utc::now())?;
    Ok((StatusCode::CREATED, Json(json!(position))).into_response())
}

async fn list_positions(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "hr.read")?;
    let positions = app.backend.hr.positions(scope.tenant_id());
    Ok(dto::items(positions.iter().map(|p| json!(p)).collect()))
}

#[derive(Debug, Deserialize)]
struct LeaveTypeRequest {
    code: String,
    label: String,
    #[serde(default = "paid_by_default")]
    paid: bool,
}

fn paid_by_default() -> bool {
    true
}

async fn save_leave_type(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<LeaveTypeRequest>,
) -> ApiResult {
    require(&scope, "hr.write")?;
    let leave_type = LeaveType::new(&body.code, &body.label, body.paid)?;
    app.backend
        .hr
        .save_leave_type(scope.tenant_id(), leave_type.clone(), Utc::now())?;
    Ok((StatusCode::CREATED, Json(json!(leave_type))).into_response())
}

/// Leave types are readable by everyone who may file a request.
async fn list_leave_types(Extension(app): Extension<AppState>, scope: Scope) -> ApiResult {
    require(&scope, "leave.read")?;
    let types = app.backend.hr.leave_types(scope.tenant_id(), Utc::now())?;
    Ok(dto::items(types.iter().map(|t| json!(t)).collect()))
}

#[derive(Debug, Deserialize)]
struct ValidatorRequest {
    validator_id: String,
}

async fn set_leave_validator(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(user_id): Path<String>,
    Json(body): Json<ValidatorRequest>,
) -> ApiResult {
    require(&scope, "hr.write")?;
    let user = dto::parse_user(&user_id)?;
    let validator = dto::parse_user(&body.validator_id)?;
    if user == validator {
        return Err(ApiError::bad_request("a user cannot validate their own leave"));
    }
    app.backend
        .hr
        .set_validator(scope.tenant_id(), user, validator, Utc::now())?;
    Ok(dto::ok(json!({ "user_id": user, "validator_id": validator })))
}

async fn get_leave_validator(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(user_id): Path<String>,
) -> ApiResult {
    require(&scope, "hr.read")?;
    let user = dto::parse_user(&user_id)?;
    let validator = app
        .backend
        .hr
        .validator_for(scope.tenant_id(), user)
        .ok_or_else(|| ApiError::not_found("leave validator"))?;
    Ok(dto::ok(json!({ "user_id": user, "validator_id": validator })))
}

// -------------------------
// Employees
// -------------------------

/// Position and manager must exist when given.
fn check_profile(app: &AppState, tenant_id: TenantId, profile: &EmployeeProfile) -> Result<(), ApiError> {
    if let Some(code) = profile.position_code.as_deref().filter(|c| !c.trim().is_empty()) {
        app.backend
            .hr
            .position(tenant_id, &code.trim().to_uppercase())
            .ok_or_else(|| ApiError::not_found("position"))?;
    }
    if let Some(manager) = profile.manager_id {
        app.backend
            .read
            .employees
            .get(tenant_id, manager.0)
            .ok_or_else(|| ApiError::not_found("manager"))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct HireRequest {
    employee_number: Option<String>,
    hire_date: Option<NaiveDate>,
    #[serde(flatten)]
    profile: EmployeeProfile,
}

async fn hire_employee(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(body): Json<HireRequest>,
) -> ApiResult {
    let t = scope.tenant_id();
    check_profile(&app, t, &body.profile)?;

    let employee_number = match body.employee_number.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(number) => {
            if app.backend.read.employee_by_number(t, number).is_some() {
                return Err(ApiError::conflict(format!("employee number {number} already exists")));
            }
            number.to_string()
        }
        None => {
            let employees = app.backend.read.employees.list(t);
            next_reference(EMPLOYEE_NUMBER_PREFIX, employees.iter().map(|e| e.employee_number()))
        }
    };

    let id = EmployeeId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        EmployeeCommand::Hire(HireEmployee {
            tenant_id: t,
            employee_id: id,
            employee_number,
            profile: body.profile,
            hire_date: body.hire_date.unwrap_or_else(dto::today),
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, EMPLOYEE_AGGREGATE, cmd, make_employee)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListEmployeesQuery {
    q: Option<String>,
    #[serde(default)]
    include_terminated: bool,
}

async fn list_employees(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListEmployeesQuery>,
) -> ApiResult {
    require(&scope, "hr.read")?;
    let q = query.q.unwrap_or_default();
    let mut found = app.backend.read.employees.filter(scope.tenant_id(), |e| {
        (query.include_terminated || e.status() == EmployeeStatus::Active)
            && (q.is_empty() || dto::contains_ci(&e.profile().map(|p| p.full_name()).unwrap_or_default(), &q) || dto::contains_ci(e.employee_number(), &q))
    });
    found.sort_by(|a, b| a.employee_number().cmp(b.employee_number()));
    Ok(dto::items(found.iter().map(dto::employee_view).collect()))
}

async fn get_employee(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "hr.read")?;
    let id = dto::parse_id(&id, "employee")?;
    let employee = app
        .backend
        .read
        .employees
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("employee"))?;
    Ok(dto::ok(dto::employee_view(&employee)))
}

async fn update_employee(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    Json(profile): Json<EmployeeProfile>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = EmployeeId::new(dto::parse_id(&id, "employee")?);
    check_profile(&app, t, &profile)?;
    let cmd = authorized(
        &scope,
        EmployeeCommand::Update(UpdateEmployee {
            tenant_id: t,
            employee_id: id,
            profile,
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, EMPLOYEE_AGGREGATE, cmd, make_employee)?;
    Ok(dto::applied(id.0, committed.len()))
}

#[derive(Debug, Default, Deserialize)]
struct DatedRequest {
    date: Option<NaiveDate>,
}

async fn terminate_employee(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<DatedRequest>>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = EmployeeId::new(dto::parse_id(&id, "employee")?);
    let date = body.and_then(|Json(b)| b.date).unwrap_or_else(dto::today);
    let cmd = authorized(
        &scope,
        EmployeeCommand::Terminate(TerminateEmployee {
            tenant_id: t,
            employee_id: id,
            termination_date: date,
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, EMPLOYEE_AGGREGATE, cmd, make_employee)?;
    Ok(dto::applied(id.0, committed.len()))
}

// -------------------------
// Contracts
// -------------------------

async fn draft_contract(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Json(terms): Json<ContractTerms>,
) -> ApiResult {
    let t = scope.tenant_id();
    app.backend
        .read
        .employees
        .get(t, terms.employee_id.0)
        .ok_or_else(|| ApiError::not_found("employee"))?;

    let id = ContractId::new(AggregateId::new());
    let cmd = authorized(
        &scope,
        ContractCommand::Draft(DraftContract {
            tenant_id: t,
            contract_id: id,
            terms,
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTRACT_AGGREGATE, cmd, make_contract)?;
    Ok(dto::created(id.0, committed.len()))
}

#[derive(Debug, Deserialize)]
struct ListContractsQuery {
    employee_id: Option<String>,
}

async fn list_contracts(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Query(query): Query<ListContractsQuery>,
) -> ApiResult {
    require(&scope, "hr.read")?;
    let employee = query
        .employee_id
        .as_deref()
        .map(|raw| dto::parse_id(raw, "employee"))
        .transpose()?;
    let mut found = app.backend.read.contracts.filter(scope.tenant_id(), |c| {
        employee.is_none_or(|id| c.terms().is_some_and(|terms| terms.employee_id.0 == id))
    });
    found.sort_by_key(|c| c.terms().map(|terms| terms.start_date));
    Ok(dto::items(found.iter().map(dto::contract_view).collect()))
}

async fn get_contract(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    require(&scope, "hr.read")?;
    let id = dto::parse_id(&id, "contract")?;
    let contract = app
        .backend
        .read
        .contracts
        .get(scope.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("contract"))?;
    Ok(dto::ok(dto::contract_view(&contract)))
}

async fn activate_contract(Extension(app): Extension<AppState>, scope: Scope, Path(id): Path<String>) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContractId::new(dto::parse_id(&id, "contract")?);
    let cmd = authorized(
        &scope,
        ContractCommand::Activate(ActivateContract {
            tenant_id: t,
            contract_id: id,
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTRACT_AGGREGATE, cmd, make_contract)?;
    Ok(dto::applied(id.0, committed.len()))
}

async fn end_contract(
    Extension(app): Extension<AppState>,
    scope: Scope,
    Path(id): Path<String>,
    body: Option<Json<DatedRequest>>,
) -> ApiResult {
    let t = scope.tenant_id();
    let id = ContractId::new(dto::parse_id(&id, "contract")?);
    let end_date = body.and_then(|Json(b)| b.date).unwrap_or_else(dto::today);
    let cmd = authorized(
        &scope,
        ContractCommand::End(EndContract {
            tenant_id: t,
            contract_id: id,
            end_date,
            occurred_at: Utc::now(),
        }),
        "hr.write",
    )?;
    let committed = app.backend.execute(t, id.0, CONTRACT_AGGREGATE, cmd, make_contract)?;
    Ok(dto::applied(id.0, committed.len()))
}
