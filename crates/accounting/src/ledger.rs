use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

pub const LEDGER_AGGREGATE: &str = "accounting.ledger";

/// Account class; drives reporting only, balances are always debit minus credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    General,
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(Self::General),
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "income" | "revenue" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub label: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub code: String,
    pub label: String,
    pub active: bool,
}

/// One line of a journal entry. Exactly one side is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLine {
    pub account_code: String,
    #[serde(default)]
    pub debit: i64,
    #[serde(default)]
    pub credit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: AggregateId,
    pub journal_code: String,
    pub entry_date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    pub lines: Vec<EntryLine>,
}

/// Σ(debit − credit) on `account_code` over entries dated in `[from, to]`.
pub fn account_balance<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
    account_code: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> i64 {
    entries
        .into_iter()
        .filter(|e| from.is_none_or(|f| e.entry_date >= f) && to.is_none_or(|t| e.entry_date <= t))
        .flat_map(|e| e.lines.iter())
        .filter(|l| l.account_code == account_code)
        .map(|l| l.debit - l.credit)
        .sum()
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Each tenant has exactly one ledger, keyed by the tenant's own uuid.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::from_uuid(*tenant_id.as_uuid()))
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: the tenant's chart of accounts, journals and posted entries.
///
/// The ledger keeps the chart and the set of posted entry ids; balances are
/// derived from projections over `EntryPosted` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    accounts: BTreeMap<String, Account>,
    journals: BTreeMap<String, Journal>,
    posted: BTreeSet<AggregateId>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            accounts: BTreeMap::new(),
            journals: BTreeMap::new(),
            posted: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn account(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn journals(&self) -> impl Iterator<Item = &Journal> {
        self.journals.values()
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub account_type: AccountType,
    pub parent_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateAccount {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenJournal {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub code: String,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry: JournalEntry,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    OpenAccount(OpenAccount),
    DeactivateAccount(DeactivateAccount),
    OpenJournal(OpenJournal),
    PostEntry(PostEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeactivated {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalOpened {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub journal: Journal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry: JournalEntry,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    AccountOpened(AccountOpened),
    AccountDeactivated(AccountDeactivated),
    JournalOpened(JournalOpened),
    EntryPosted(EntryPosted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened(_) => "accounting.ledger.account_opened",
            LedgerEvent::AccountDeactivated(_) => "accounting.ledger.account_deactivated",
            LedgerEvent::JournalOpened(_) => "accounting.ledger.journal_opened",
            LedgerEvent::EntryPosted(_) => "accounting.ledger.entry_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::AccountOpened(e) => e.occurred_at,
            LedgerEvent::AccountDeactivated(e) => e.occurred_at,
            LedgerEvent::JournalOpened(e) => e.occurred_at,
            LedgerEvent::EntryPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let (tenant_id, ledger_id) = match event {
            LedgerEvent::AccountOpened(e) => (e.tenant_id, e.ledger_id),
            LedgerEvent::AccountDeactivated(e) => (e.tenant_id, e.ledger_id),
            LedgerEvent::JournalOpened(e) => (e.tenant_id, e.ledger_id),
            LedgerEvent::EntryPosted(e) => (e.tenant_id, e.ledger_id),
        };
        if !self.created {
            self.id = ledger_id;
            self.tenant_id = Some(tenant_id);
            self.created = true;
        }

        match event {
            LedgerEvent::AccountOpened(e) => {
                self.accounts.insert(e.account.code.clone(), e.account.clone());
            }
            LedgerEvent::AccountDeactivated(e) => {
                if let Some(account) = self.accounts.get_mut(&e.code) {
                    account.active = false;
                }
            }
            LedgerEvent::JournalOpened(e) => {
                self.journals.insert(e.journal.code.clone(), e.journal.clone());
            }
            LedgerEvent::EntryPosted(e) => {
                self.posted.insert(e.entry.entry_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::OpenAccount(cmd) => {
                self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;
                let code = normalize_code(&cmd.code, "account code")?;
                if self.accounts.contains_key(&code) {
                    return Err(DomainError::conflict(format!("account {code} already exists")));
                }
                let parent_code = match cmd.parent_code.as_deref().and_then(|p| optional_text(Some(p))) {
                    Some(parent) => {
                        let parent = parent.to_uppercase();
                        if !self.accounts.contains_key(&parent) {
                            return Err(DomainError::validation(format!("unknown parent account {parent}")));
                        }
                        Some(parent)
                    }
                    None => None,
                };
                Ok(vec![LedgerEvent::AccountOpened(AccountOpened {
                    tenant_id: cmd.tenant_id,
                    ledger_id: cmd.ledger_id,
                    account: Account {
                        code,
                        label: required_text(&cmd.label, "label")?,
                        account_type: cmd.account_type,
                        parent_code,
                        active: true,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            LedgerCommand::DeactivateAccount(cmd) => {
                self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;
                let code = cmd.code.trim().to_uppercase();
                match self.accounts.get(&code) {
                    None => Err(DomainError::not_found()),
                    Some(a) if !a.active => Err(DomainError::conflict("account is already inactive")),
                    Some(_) => Ok(vec![LedgerEvent::AccountDeactivated(AccountDeactivated {
                        tenant_id: cmd.tenant_id,
                        ledger_id: cmd.ledger_id,
                        code,
                        occurred_at: cmd.occurred_at,
                    })]),
                }
            }
            LedgerCommand::OpenJournal(cmd) => {
                self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;
                let code = normalize_code(&cmd.code, "journal code")?;
                if self.journals.contains_key(&code) {
                    return Err(DomainError::conflict(format!("journal {code} already exists")));
                }
                Ok(vec![LedgerEvent::JournalOpened(JournalOpened {
                    tenant_id: cmd.tenant_id,
                    ledger_id: cmd.ledger_id,
                    journal: Journal {
                        code,
                        label: required_text(&cmd.label, "label")?,
                        active: true,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            LedgerCommand::PostEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn ensure_ledger(&self, tenant_id: TenantId, ledger_id: LedgerId) -> Result<(), DomainError> {
        if ledger_id != LedgerId::for_tenant(tenant_id) {
            return Err(DomainError::invariant("ledger_id mismatch"));
        }
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;
        let entry = &cmd.entry;

        if self.posted.contains(&entry.entry_id) {
            return Err(DomainError::conflict("entry already posted"));
        }
        let journal_code = entry.journal_code.trim().to_uppercase();
        if !self.journals.get(&journal_code).is_some_and(|j| j.active) {
            return Err(DomainError::validation(format!("unknown journal {journal_code}")));
        }
        if entry.lines.len() < 2 {
            return Err(DomainError::validation("journal entry needs at least two lines"));
        }

        let mut debit_total: i128 = 0;
        let mut credit_total: i128 = 0;
        let mut lines = Vec::with_capacity(entry.lines.len());
        for line in &entry.lines {
            if line.debit < 0 || line.credit < 0 {
                return Err(DomainError::validation("amounts cannot be negative"));
            }
            if (line.debit > 0) == (line.credit > 0) {
                return Err(DomainError::validation("each line must be either a debit or a credit"));
            }
            let account_code = line.account_code.trim().to_uppercase();
            match self.accounts.get(&account_code) {
                Some(a) if a.active => {}
                Some(_) => return Err(DomainError::validation(format!("account {account_code} is inactive"))),
                None => return Err(DomainError::validation(format!("unknown account {account_code}"))),
            }
            debit_total += i128::from(line.debit);
            credit_total += i128::from(line.credit);
            lines.push(EntryLine {
                account_code,
                debit: line.debit,
                credit: line.credit,
            });
        }

        if debit_total != credit_total {
            return Err(DomainError::invariant("debits must equal credits"));
        }

        Ok(vec![LedgerEvent::EntryPosted(EntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry: JournalEntry {
                entry_id: entry.entry_id,
                journal_code,
                entry_date: entry.entry_date,
                reference: optional_text(entry.reference.as_deref()),
                description: required_text(&entry.description, "description")?,
                lines,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    /// Ledger with accounts 512 (bank) and 706 (sales) and a VT journal.
    fn seeded() -> (Ledger, TenantId) {
        let tenant_id = TenantId::new();
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let mut ledger = Ledger::empty(ledger_id);
        for (code, kind) in [("512", AccountType::Asset), ("706", AccountType::Income)] {
            execute(
                &mut ledger,
                &LedgerCommand::OpenAccount(OpenAccount {
                    tenant_id,
                    ledger_id,
                    code: code.to_string(),
                    label: format!("Account {code}"),
                    account_type: kind,
                    parent_code: None,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }
        execute(
            &mut ledger,
            &LedgerCommand::OpenJournal(OpenJournal {
                tenant_id,
                ledger_id,
                code: "vt".to_string(),
                label: "Sales".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (ledger, tenant_id)
    }

    fn line(account: &str, debit: i64, credit: i64) -> EntryLine {
        EntryLine {
            account_code: account.to_string(),
            debit,
            credit,
        }
    }

    fn post(tenant_id: TenantId, date: NaiveDate, lines: Vec<EntryLine>) -> LedgerCommand {
        LedgerCommand::PostEntry(PostEntry {
            tenant_id,
            ledger_id: LedgerId::for_tenant(tenant_id),
            entry: JournalEntry {
                entry_id: AggregateId::new(),
                journal_code: "VT".to_string(),
                entry_date: date,
                reference: Some("INV-00001".to_string()),
                description: "Invoice".to_string(),
                lines,
            },
            occurred_at: test_time(),
        })
    }

    fn posted_entries(events: &[LedgerEvent]) -> Vec<JournalEntry> {
        events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::EntryPosted(p) => Some(p.entry.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn balanced_entry_is_posted() {
        let (mut ledger, tenant_id) = seeded();
        let events = execute(&mut ledger, &post(tenant_id, day(5), vec![line("512", 1_200, 0), line("706", 0, 1_200)])).unwrap();
        let entries = posted_entries(&events);
        assert_eq!(account_balance(&entries, "512", None, None), 1_200);
        assert_eq!(account_balance(&entries, "706", None, None), -1_200);
        assert_eq!(account_balance(&entries, "512", Some(day(6)), None), 0);
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let (ledger, tenant_id) = seeded();
        let err = ledger
            .handle(&post(tenant_id, day(5), vec![line("512", 100, 0), line("706", 0, 90)]))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            other => panic!("Expected invariant violation for unbalanced entry, got {other:?}"),
        }
    }

    #[test]
    fn single_line_and_two_sided_lines_are_rejected() {
        let (ledger, tenant_id) = seeded();
        assert!(ledger.handle(&post(tenant_id, day(1), vec![line("512", 0, 0)])).is_err());
        assert!(
            ledger
                .handle(&post(tenant_id, day(1), vec![line("512", 10, 10), line("706", 0, 0)]))
                .is_err()
        );
    }

    #[test]
    fn inactive_or_unknown_accounts_are_rejected() {
        let (mut ledger, tenant_id) = seeded();
        execute(
            &mut ledger,
            &LedgerCommand::DeactivateAccount(DeactivateAccount {
                tenant_id,
                ledger_id: LedgerId::for_tenant(tenant_id),
                code: "706".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        let err = ledger
            .handle(&post(tenant_id, day(1), vec![line("512", 5, 0), line("706", 0, 5)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("inactive")));
        let err = ledger
            .handle(&post(tenant_id, day(1), vec![line("512", 5, 0), line("999", 0, 5)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("unknown account")));
    }

    #[test]
    fn duplicate_account_code_conflicts() {
        let (ledger, tenant_id) = seeded();
        let err = ledger
            .handle(&LedgerCommand::OpenAccount(OpenAccount {
                tenant_id,
                ledger_id: LedgerId::for_tenant(tenant_id),
                code: " 512 ".to_string(),
                label: "Again".to_string(),
                account_type: AccountType::Asset,
                parent_code: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn ledger_of_another_tenant_is_refused() {
        let (ledger, _) = seeded();
        let other = TenantId::new();
        let err = ledger.handle(&post(other, day(1), vec![line("512", 1, 0), line("706", 0, 1)])).unwrap_err();
        assert_eq!(err, DomainError::invariant("ledger_id mismatch"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Over any sequence of posted entries, balances across all accounts sum to zero.
        #[test]
        fn balances_sum_to_zero(amounts in prop::collection::vec((1i64..1_000_000i64, 1u32..28), 1..10)) {
            let (mut ledger, tenant_id) = seeded();
            let mut entries = Vec::new();
            for (amount, d) in amounts {
                let events = execute(
                    &mut ledger,
                    &post(tenant_id, day(d), vec![line("512", amount, 0), line("706", 0, amount)]),
                ).unwrap();
                entries.extend(posted_entries(&events));
            }
            let total = account_balance(&entries, "512", None, None) + account_balance(&entries, "706", None, None);
            prop_assert_eq!(total, 0);
        }
    }
}
