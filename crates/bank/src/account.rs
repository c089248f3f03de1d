use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

pub const BANK_ACCOUNT_AGGREGATE: &str = "bank.account";

pub const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankAccountId(pub AggregateId);

impl BankAccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BankAccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A single debit or credit on the account. `amount` is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: AggregateId,
    pub value_date: NaiveDate,
    pub amount: i64,
    pub description: String,
    pub reference: Option<String>,
    #[serde(default)]
    pub payment_id: Option<AggregateId>,
    #[serde(default)]
    pub invoice_id: Option<AggregateId>,
}

/// Aggregate root: a bank or cash account and its movements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    id: BankAccountId,
    tenant_id: Option<TenantId>,
    name: String,
    iban: Option<String>,
    bic: Option<String>,
    currency: String,
    active: bool,
    balance: i64,
    movement_ids: Vec<AggregateId>,
    version: u64,
    created: bool,
}

impl BankAccount {
    pub fn empty(id: BankAccountId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            iban: None,
            bic: None,
            currency: String::new(),
            active: false,
            balance: 0,
            movement_ids: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn iban(&self) -> Option<&str> {
        self.iban.as_deref()
    }

    pub fn bic(&self) -> Option<&str> {
        self.bic.as_deref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sum of all movement amounts.
    pub fn balance(&self) -> i64 {
        self.balance
    }
}

impl AggregateRoot for BankAccount {
    type Id = BankAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBankAccount {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub name: String,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub currency: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub movement: Movement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseBankAccount {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountCommand {
    Open(OpenBankAccount),
    RecordMovement(RecordMovement),
    Close(CloseBankAccount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountOpened {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub name: String,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub movement: Movement,
    pub new_balance: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountClosed {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountEvent {
    Opened(BankAccountOpened),
    MovementRecorded(MovementRecorded),
    Closed(BankAccountClosed),
}

impl Event for BankAccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BankAccountEvent::Opened(_) => "bank.account.opened",
            BankAccountEvent::MovementRecorded(_) => "bank.account.movement_recorded",
            BankAccountEvent::Closed(_) => "bank.account.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BankAccountEvent::Opened(e) => e.occurred_at,
            BankAccountEvent::MovementRecorded(e) => e.occurred_at,
            BankAccountEvent::Closed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BankAccount {
    type Command = BankAccountCommand;
    type Event = BankAccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BankAccountEvent::Opened(e) => {
                self.id = e.account_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.iban = e.iban.clone();
                self.bic = e.bic.clone();
                self.currency = e.currency.clone();
                self.active = true;
                self.created = true;
            }
            BankAccountEvent::MovementRecorded(e) => {
                self.balance = e.new_balance;
                self.movement_ids.push(e.movement.movement_id);
            }
            BankAccountEvent::Closed(_) => self.active = false,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BankAccountCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("bank account already exists"));
                }
                let currency = match cmd.currency.as_deref().and_then(|c| optional_text(Some(c))) {
                    Some(c) if c.len() == 3 => c.to_uppercase(),
                    Some(_) => return Err(DomainError::validation("currency must be a 3-letter ISO code")),
                    None => DEFAULT_CURRENCY.to_string(),
                };
                Ok(vec![BankAccountEvent::Opened(BankAccountOpened {
                    tenant_id: cmd.tenant_id,
                    account_id: cmd.account_id,
                    name: required_text(&cmd.name, "name")?,
                    iban: optional_text(cmd.iban.as_deref()).map(|i| i.replace(' ', "").to_uppercase()),
                    bic: optional_text(cmd.bic.as_deref()).map(|b| b.to_uppercase()),
                    currency,
                    occurred_at: cmd.occurred_at,
                })])
            }
            BankAccountCommand::RecordMovement(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
                if !self.active {
                    return Err(DomainError::invariant("cannot record movements on a closed account"));
                }
                let movement = &cmd.movement;
                if movement.amount == 0 {
                    return Err(DomainError::validation("movement amount cannot be zero"));
                }
                if self.movement_ids.contains(&movement.movement_id) {
                    return Err(DomainError::conflict("movement already recorded"));
                }
                let new_balance = self
                    .balance
                    .checked_add(movement.amount)
                    .ok_or_else(|| DomainError::invariant("balance overflow"))?;
                Ok(vec![BankAccountEvent::MovementRecorded(MovementRecorded {
                    tenant_id: cmd.tenant_id,
                    account_id: cmd.account_id,
                    movement: Movement {
                        description: required_text(&movement.description, "description")?,
                        reference: optional_text(movement.reference.as_deref()),
                        ..movement.clone()
                    },
                    new_balance,
                    occurred_at: cmd.occurred_at,
                })])
            }
            BankAccountCommand::Close(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
                if !self.active {
                    return Err(DomainError::conflict("bank account is already closed"));
                }
                Ok(vec![BankAccountEvent::Closed(BankAccountClosed {
                    tenant_id: cmd.tenant_id,
                    account_id: cmd.account_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl BankAccount {
    fn ensure_existing(&self, tenant_id: TenantId, account_id: BankAccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    fn opened() -> (BankAccount, TenantId) {
        let tenant_id = TenantId::new();
        let id = BankAccountId::new(AggregateId::new());
        let mut account = BankAccount::empty(id);
        execute(
            &mut account,
            &BankAccountCommand::Open(OpenBankAccount {
                tenant_id,
                account_id: id,
                name: "Main account".to_string(),
                iban: Some("fr76 3000 6000 0112 3456 7890 189".to_string()),
                bic: None,
                currency: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (account, tenant_id)
    }

    fn movement(account: &BankAccount, tenant_id: TenantId, amount: i64) -> BankAccountCommand {
        BankAccountCommand::RecordMovement(RecordMovement {
            tenant_id,
            account_id: *account.id(),
            movement: Movement {
                movement_id: AggregateId::new(),
                value_date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                amount,
                description: "Customer transfer".to_string(),
                reference: None,
                payment_id: None,
                invoice_id: None,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn open_defaults_currency_and_normalises_iban() {
        let (account, _) = opened();
        assert_eq!(account.currency(), "EUR");
        assert_eq!(account.iban(), Some("FR7630006000011234567890189"));
    }

    #[test]
    fn balance_follows_signed_movements() {
        let (mut account, tenant_id) = opened();
        let credit = movement(&account, tenant_id, 15_000);
        execute(&mut account, &credit).unwrap();
        let debit = movement(&account, tenant_id, -4_000);
        execute(&mut account, &debit).unwrap();
        assert_eq!(account.balance(), 11_000);
    }

    #[test]
    fn zero_movement_is_rejected() {
        let (account, tenant_id) = opened();
        let err = account.handle(&movement(&account, tenant_id, 0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn closed_account_refuses_movements() {
        let (mut account, tenant_id) = opened();
        let close = BankAccountCommand::Close(CloseBankAccount {
            tenant_id,
            account_id: *account.id(),
            occurred_at: Utc::now(),
        });
        execute(&mut account, &close).unwrap();
        let err = account.handle(&movement(&account, tenant_id, 10)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("closed") => {}
            other => panic!("Expected invariant violation, got {other:?}"),
        }
    }
}
