use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

use crate::employee::EmployeeId;

pub const CONTRACT_AGGREGATE: &str = "hr.contract";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub AggregateId);

impl ContractId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Permanent,
    FixedTerm,
    Internship,
    Apprenticeship,
    Freelance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Draft,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub employee_id: EmployeeId,
    pub contract_type: ContractType,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Yearly gross salary, minor units.
    pub salary: i64,
}

impl ContractTerms {
    fn validate(&self) -> Result<(), DomainError> {
        if self.end_date.is_some_and(|e| e < self.start_date) {
            return Err(DomainError::validation("end date cannot precede the start date"));
        }
        if self.salary < 0 {
            return Err(DomainError::validation("salary cannot be negative"));
        }
        if self.contract_type == ContractType::FixedTerm && self.end_date.is_none() {
            return Err(DomainError::validation("fixed-term contracts need an end date"));
        }
        Ok(())
    }
}

/// Aggregate root: an employment contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    id: ContractId,
    tenant_id: Option<TenantId>,
    terms: Option<ContractTerms>,
    status: ContractStatus,
    version: u64,
    created: bool,
}

impl Contract {
    pub fn empty(id: ContractId) -> Self {
        Self {
            id,
            tenant_id: None,
            terms: None,
            status: ContractStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn terms(&self) -> Option<&ContractTerms> {
        self.terms.as_ref()
    }

    pub fn status(&self) -> ContractStatus {
        self.status
    }
}

impl AggregateRoot for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub terms: ContractTerms,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCommand {
    Draft(DraftContract),
    Activate(ActivateContract),
    End(EndContract),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDrafted {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub terms: ContractTerms,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractActivated {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEnded {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    Drafted(ContractDrafted),
    Activated(ContractActivated),
    Ended(ContractEnded),
}

impl Event for ContractEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContractEvent::Drafted(_) => "hr.contract.drafted",
            ContractEvent::Activated(_) => "hr.contract.activated",
            ContractEvent::Ended(_) => "hr.contract.ended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContractEvent::Drafted(e) => e.occurred_at,
            ContractEvent::Activated(e) => e.occurred_at,
            ContractEvent::Ended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contract {
    type Command = ContractCommand;
    type Event = ContractEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContractEvent::Drafted(e) => {
                self.id = e.contract_id;
                self.tenant_id = Some(e.tenant_id);
                self.terms = Some(e.terms.clone());
                self.status = ContractStatus::Draft;
                self.created = true;
            }
            ContractEvent::Activated(_) => self.status = ContractStatus::Active,
            ContractEvent::Ended(e) => {
                if let Some(terms) = self.terms.as_mut() {
                    terms.end_date = Some(e.end_date);
                }
                self.status = ContractStatus::Ended;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContractCommand::Draft(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("contract already exists"));
                }
                cmd.terms.validate()?;
                Ok(vec![ContractEvent::Drafted(ContractDrafted {
                    tenant_id: cmd.tenant_id,
                    contract_id: cmd.contract_id,
                    terms: cmd.terms.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContractCommand::Activate(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;
                if self.status != ContractStatus::Draft {
                    return Err(DomainError::invariant("only draft contracts can be activated"));
                }
                Ok(vec![ContractEvent::Activated(ContractActivated {
                    tenant_id: cmd.tenant_id,
                    contract_id: cmd.contract_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ContractCommand::End(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;
                if self.status != ContractStatus::Active {
                    return Err(DomainError::invariant("only active contracts can be ended"));
                }
                if self.terms.as_ref().is_some_and(|t| cmd.end_date < t.start_date) {
                    return Err(DomainError::validation("end date cannot precede the start date"));
                }
                Ok(vec![ContractEvent::Ended(ContractEnded {
                    tenant_id: cmd.tenant_id,
                    contract_id: cmd.contract_id,
                    end_date: cmd.end_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Contract {
    fn ensure_existing(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != contract_id {
            return Err(DomainError::invariant("contract_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn terms(kind: ContractType, end: Option<NaiveDate>) -> ContractTerms {
        ContractTerms {
            employee_id: EmployeeId::new(AggregateId::new()),
            contract_type: kind,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            end_date: end,
            salary: 4_200_000,
        }
    }

    #[test]
    fn draft_activate_end() {
        let tenant_id = TenantId::new();
        let id = ContractId::new(AggregateId::new());
        let mut c = Contract::empty(id);
        execute(
            &mut c,
            &ContractCommand::Draft(DraftContract {
                tenant_id,
                contract_id: id,
                terms: terms(ContractType::Permanent, None),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let end = ContractCommand::End(EndContract {
            tenant_id,
            contract_id: id,
            end_date: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(c.handle(&end), Err(DomainError::InvariantViolation(_))));

        execute(
            &mut c,
            &ContractCommand::Activate(ActivateContract {
                tenant_id,
                contract_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(&mut c, &end).unwrap();
        assert_eq!(c.status(), ContractStatus::Ended);
        assert!(c.terms().unwrap().end_date.is_some());
    }

    #[test]
    fn fixed_term_needs_end_date() {
        let id = ContractId::new(AggregateId::new());
        let err = Contract::empty(id)
            .handle(&ContractCommand::Draft(DraftContract {
                tenant_id: TenantId::new(),
                contract_id: id,
                terms: terms(ContractType::FixedTerm, None),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let id = ContractId::new(AggregateId::new());
        let err = Contract::empty(id)
            .handle(&ContractCommand::Draft(DraftContract {
                tenant_id: TenantId::new(),
                contract_id: id,
                terms: terms(ContractType::Internship, NaiveDate::from_ymd_opt(2025, 12, 31)),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("end date")));
    }
}
