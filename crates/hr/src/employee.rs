use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use atelier_events::Event;

pub const EMPLOYEE_AGGREGATE: &str = "hr.employee";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub AggregateId);

impl EmployeeId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Terminated,
}

/// Personal and organisational data that may change over the employment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub position_code: Option<String>,
    #[serde(default)]
    pub manager_id: Option<EmployeeId>,
}

impl EmployeeProfile {
    fn normalized(&self, self_id: EmployeeId) -> Result<Self, DomainError> {
        if self.manager_id == Some(self_id) {
            return Err(DomainError::validation("an employee cannot be their own manager"));
        }
        let email = optional_text(self.email.as_deref());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(DomainError::validation("email is not valid"));
        }
        Ok(Self {
            first_name: required_text(&self.first_name, "first_name")?,
            last_name: required_text(&self.last_name, "last_name")?,
            email,
            user_id: self.user_id,
            position_code: optional_text(self.position_code.as_deref()).map(|c| c.to_uppercase()),
            manager_id: self.manager_id,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Aggregate root: an employee record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    id: EmployeeId,
    tenant_id: Option<TenantId>,
    employee_number: String,
    profile: Option<EmployeeProfile>,
    hire_date: Option<NaiveDate>,
    termination_date: Option<NaiveDate>,
    status: EmployeeStatus,
    version: u64,
    created: bool,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            tenant_id: None,
            employee_number: String::new(),
            profile: None,
            hire_date: None,
            termination_date: None,
            status: EmployeeStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn employee_number(&self) -> &str {
        &self.employee_number
    }

    pub fn profile(&self) -> Option<&EmployeeProfile> {
        self.profile.as_ref()
    }

    pub fn hire_date(&self) -> Option<NaiveDate> {
        self.hire_date
    }

    pub fn termination_date(&self) -> Option<NaiveDate> {
        self.termination_date
    }

    pub fn status(&self) -> EmployeeStatus {
        self.status
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub employee_number: String,
    pub profile: EmployeeProfile,
    pub hire_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub profile: EmployeeProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub termination_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    Hire(HireEmployee),
    Update(UpdateEmployee),
    Terminate(TerminateEmployee),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeHired {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub employee_number: String,
    pub profile: EmployeeProfile,
    pub hire_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUpdated {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub profile: EmployeeProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTerminated {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub termination_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    Hired(EmployeeHired),
    Updated(EmployeeUpdated),
    Terminated(EmployeeTerminated),
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::Hired(_) => "hr.employee.hired",
            EmployeeEvent::Updated(_) => "hr.employee.updated",
            EmployeeEvent::Terminated(_) => "hr.employee.terminated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::Hired(e) => e.occurred_at,
            EmployeeEvent::Updated(e) => e.occurred_at,
            EmployeeEvent::Terminated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::Hired(e) => {
                self.id = e.employee_id;
                self.tenant_id = Some(e.tenant_id);
                self.employee_number = e.employee_number.clone();
                self.profile = Some(e.profile.clone());
                self.hire_date = Some(e.hire_date);
                self.status = EmployeeStatus::Active;
                self.created = true;
            }
            EmployeeEvent::Updated(e) => self.profile = Some(e.profile.clone()),
            EmployeeEvent::Terminated(e) => {
                self.termination_date = Some(e.termination_date);
                self.status = EmployeeStatus::Terminated;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::Hire(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("employee already exists"));
                }
                Ok(vec![EmployeeEvent::Hired(EmployeeHired {
                    tenant_id: cmd.tenant_id,
                    employee_id: cmd.employee_id,
                    employee_number: normalize_code(&cmd.employee_number, "employee_number")?,
                    profile: cmd.profile.normalized(cmd.employee_id)?,
                    hire_date: cmd.hire_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            EmployeeCommand::Update(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.employee_id)?;
                Ok(vec![EmployeeEvent::Updated(EmployeeUpdated {
                    tenant_id: cmd.tenant_id,
                    employee_id: cmd.employee_id,
                    profile: cmd.profile.normalized(cmd.employee_id)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            EmployeeCommand::Terminate(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.employee_id)?;
                if self.status == EmployeeStatus::Terminated {
                    return Err(DomainError::conflict("employee is already terminated"));
                }
                if self.hire_date.is_some_and(|h| cmd.termination_date < h) {
                    return Err(DomainError::validation("termination date cannot precede the hire date"));
                }
                Ok(vec![EmployeeEvent::Terminated(EmployeeTerminated {
                    tenant_id: cmd.tenant_id,
                    employee_id: cmd.employee_id,
                    termination_date: cmd.termination_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Employee {
    fn ensure_existing(&self, tenant_id: TenantId, employee_id: EmployeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != employee_id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn profile() -> EmployeeProfile {
        EmployeeProfile {
            first_name: "Ada".to_string(),
            last_name: " Lovelace ".to_string(),
            email: Some("ada@example.test".to_string()),
            user_id: None,
            position_code: Some("dev".to_string()),
            manager_id: None,
        }
    }

    fn hired() -> (Employee, TenantId) {
        let tenant_id = TenantId::new();
        let id = EmployeeId::new(AggregateId::new());
        let mut e = Employee::empty(id);
        execute(
            &mut e,
            &EmployeeCommand::Hire(HireEmployee {
                tenant_id,
                employee_id: id,
                employee_number: "e-001".to_string(),
                profile: profile(),
                hire_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (e, tenant_id)
    }

    #[test]
    fn hire_normalises_profile() {
        let (e, _) = hired();
        assert_eq!(e.employee_number(), "E-001");
        let p = e.profile().unwrap();
        assert_eq!(p.full_name(), "Ada Lovelace");
        assert_eq!(p.position_code.as_deref(), Some("DEV"));
    }

    #[test]
    fn termination_cannot_precede_hire() {
        let (e, tenant_id) = hired();
        let err = e
            .handle(&EmployeeCommand::Terminate(TerminateEmployee {
                tenant_id,
                employee_id: *e.id(),
                termination_date: NaiveDate::from_ymd_opt(2024, 8, 31).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn terminate_once() {
        let (mut e, tenant_id) = hired();
        let cmd = EmployeeCommand::Terminate(TerminateEmployee {
            tenant_id,
            employee_id: *e.id(),
            termination_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            occurred_at: Utc::now(),
        });
        execute(&mut e, &cmd).unwrap();
        assert_eq!(e.status(), EmployeeStatus::Terminated);
        assert!(matches!(e.handle(&cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn self_management_is_rejected() {
        let (e, tenant_id) = hired();
        let mut p = profile();
        p.manager_id = Some(*e.id());
        let err = e
            .handle(&EmployeeCommand::Update(UpdateEmployee {
                tenant_id,
                employee_id: *e.id(),
                profile: p,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
