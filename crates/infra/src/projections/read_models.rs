//! The full set of read models, one per aggregate type, plus the event-carried
//! rows (journal entries, bank movements).

use serde::{Deserialize, Serialize};

use atelier_accounting::{JournalEntry, LEDGER_AGGREGATE, Ledger, LedgerEvent, LedgerId};
use atelier_agenda::{AGENDA_EVENT_AGGREGATE, AgendaEvent, AgendaEventId};
use atelier_bank::{BANK_ACCOUNT_AGGREGATE, BankAccount, BankAccountEvent, BankAccountId, Movement};
use atelier_catalog::{CATEGORY_AGGREGATE, Category, CategoryId, PRODUCT_AGGREGATE, Product, ProductId};
use atelier_core::{AggregateId, TenantId};
use atelier_events::JsonEnvelope;
use atelier_ged::{DOCUMENT_AGGREGATE, Document, DocumentId};
use atelier_hr::{
    CONTRACT_AGGREGATE, Contract, ContractId, EMPLOYEE_AGGREGATE, Employee, EmployeeId, LEAVE_REQUEST_AGGREGATE,
    LeaveRequest, LeaveRequestId,
};
use atelier_invoicing::{INVOICE_AGGREGATE, Invoice, InvoiceId};
use atelier_parties::{CONTACT_AGGREGATE, Contact, ContactId, THIRD_PARTY_AGGREGATE, ThirdParty, ThirdPartyId};
use atelier_sales::{PROPOSAL_AGGREGATE, Proposal, ProposalId, SALES_ORDER_AGGREGATE, SalesOrder, SalesOrderId};
use atelier_ticketing::{TICKET_AGGREGATE, Ticket, TicketId};

use super::{AggregateProjection, EnvelopeProjection, ProjectionError, RecordProjection};

/// A bank movement together with the account it was booked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMovement {
    pub account_id: BankAccountId,
    pub movement: Movement,
}

fn entry_row(_ledger: AggregateId, event: &LedgerEvent) -> Option<(AggregateId, JournalEntry)> {
    match event {
        LedgerEvent::EntryPosted(posted) => Some((posted.entry.entry_id, posted.entry.clone())),
        _ => None,
    }
}

fn movement_row(account: AggregateId, event: &BankAccountEvent) -> Option<(AggregateId, AccountMovement)> {
    match event {
        BankAccountEvent::MovementRecorded(recorded) => Some((
            recorded.movement.movement_id,
            AccountMovement {
                account_id: BankAccountId::new(account),
                movement: recorded.movement.clone(),
            },
        )),
        _ => None,
    }
}

fn same_code(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub struct ReadModels {
    pub third_parties: AggregateProjection<ThirdParty>,
    pub contacts: AggregateProjection<Contact>,
    pub categories: AggregateProjection<Category>,
    pub products: AggregateProjection<Product>,
    pub proposals: AggregateProjection<Proposal>,
    pub orders: AggregateProjection<SalesOrder>,
    pub invoices: AggregateProjection<Invoice>,
    pub ledgers: AggregateProjection<Ledger>,
    pub ledger_entries: RecordProjection<LedgerEvent, JournalEntry>,
    pub bank_accounts: AggregateProjection<BankAccount>,
    pub bank_movements: RecordProjection<BankAccountEvent, AccountMovement>,
    pub employees: AggregateProjection<Employee>,
    pub contracts: AggregateProjection<Contract>,
    pub leave_requests: AggregateProjection<LeaveRequest>,
    pub documents: AggregateProjection<Document>,
    pub tickets: AggregateProjection<Ticket>,
    pub agenda: AggregateProjection<AgendaEvent>,
}

impl Default for ReadModels {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadModels {
    pub fn new() -> Self {
        Self {
            third_parties: AggregateProjection::new("parties.third_parties", THIRD_PARTY_AGGREGATE, |id| {
                ThirdParty::empty(ThirdPartyId::new(id))
            }),
            contacts: AggregateProjection::new("parties.contacts", CONTACT_AGGREGATE, |id| {
                Contact::empty(ContactId::new(id))
            }),
            categories: AggregateProjection::new("catalog.categories", CATEGORY_AGGREGATE, |id| {
                Category::empty(CategoryId::new(id))
            }),
            products: AggregateProjection::new("catalog.products", PRODUCT_AGGREGATE, |id| {
                Product::empty(ProductId::new(id))
            }),
            proposals: AggregateProjection::new("sales.proposals", PROPOSAL_AGGREGATE, |id| {
                Proposal::empty(ProposalId::new(id))
            }),
            orders: AggregateProjection::new("sales.orders", SALES_ORDER_AGGREGATE, |id| {
                SalesOrder::empty(SalesOrderId::new(id))
            }),
            invoices: AggregateProjection::new("invoicing.invoices", INVOICE_AGGREGATE, |id| {
                Invoice::empty(InvoiceId::new(id))
            }),
            ledgers: AggregateProjection::new("accounting.ledgers", LEDGER_AGGREGATE, |id| {
                Ledger::empty(LedgerId::new(id))
            }),
            ledger_entries: RecordProjection::new("accounting.entries", LEDGER_AGGREGATE, entry_row),
            bank_accounts: AggregateProjection::new("bank.accounts", BANK_ACCOUNT_AGGREGATE, |id| {
                BankAccount::empty(BankAccountId::new(id))
            }),
            bank_movements: RecordProjection::new("bank.movements", BANK_ACCOUNT_AGGREGATE, movement_row),
            employees: AggregateProjection::new("hr.employees", EMPLOYEE_AGGREGATE, |id| {
                Employee::empty(EmployeeId::new(id))
            }),
            contracts: AggregateProjection::new("hr.contracts", CONTRACT_AGGREGATE, |id| {
                Contract::empty(ContractId::new(id))
            }),
            leave_requests: AggregateProjection::new("hr.leave_requests", LEAVE_REQUEST_AGGREGATE, |id| {
                LeaveRequest::empty(LeaveRequestId::new(id))
            }),
            documents: AggregateProjection::new("ged.documents", DOCUMENT_AGGREGATE, |id| {
                Document::empty(DocumentId::new(id))
            }),
            tickets: AggregateProjection::new("ticketing.tickets", TICKET_AGGREGATE, |id| {
                Ticket::empty(TicketId::new(id))
            }),
            agenda: AggregateProjection::new("agenda.events", AGENDA_EVENT_AGGREGATE, |id| {
                AgendaEvent::empty(AgendaEventId::new(id))
            }),
        }
    }

    pub fn all(&self) -> [&dyn EnvelopeProjection; 17] {
        [
            &self.third_parties,
            &self.contacts,
            &self.categories,
            &self.products,
            &self.proposals,
            &self.orders,
            &self.invoices,
            &self.ledgers,
            &self.ledger_entries,
            &self.bank_accounts,
            &self.bank_movements,
            &self.employees,
            &self.contracts,
            &self.leave_requests,
            &self.documents,
            &self.tickets,
            &self.agenda,
        ]
    }

    /// Each projection ignores envelopes of other aggregate types.
    pub fn apply(&self, envelope: &JsonEnvelope) -> Result<(), ProjectionError> {
        for projection in self.all() {
            projection.apply_envelope(envelope)?;
        }
        Ok(())
    }

    pub fn rebuild(&self, envelopes: &[JsonEnvelope]) -> Result<(), ProjectionError> {
        for projection in self.all() {
            projection.rebuild_from_scratch(envelopes.to_vec())?;
        }
        Ok(())
    }

    /// Live (not deleted) third party with this code.
    pub fn third_party_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ThirdParty> {
        self.third_parties
            .find(tenant_id, |t| !t.is_deleted() && same_code(t.code(), code))
    }

    pub fn category_by_code(&self, tenant_id: TenantId, code: &str) -> Option<Category> {
        self.categories.find(tenant_id, |c| same_code(c.code(), code))
    }

    pub fn product_by_code(&self, tenant_id: TenantId, code: &str) -> Option<Product> {
        self.products.find(tenant_id, |p| same_code(p.code(), code))
    }

    pub fn proposal_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<Proposal> {
        self.proposals.find(tenant_id, |p| same_code(p.reference(), reference))
    }

    pub fn order_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<SalesOrder> {
        self.orders.find(tenant_id, |o| same_code(o.reference(), reference))
    }

    pub fn invoice_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<Invoice> {
        self.invoices.find(tenant_id, |i| same_code(i.reference(), reference))
    }

    pub fn employee_by_number(&self, tenant_id: TenantId, number: &str) -> Option<Employee> {
        self.employees
            .find(tenant_id, |e| same_code(e.employee_number(), number))
    }

    pub fn ledger(&self, tenant_id: TenantId) -> Option<Ledger> {
        self.ledgers.get(tenant_id, LedgerId::for_tenant(tenant_id).0)
    }

    /// Entries of one journal (or all), most recent first.
    pub fn journal_entries(&self, tenant_id: TenantId, journal_code: Option<&str>) -> Vec<JournalEntry> {
        let mut entries: Vec<_> = self
            .ledger_entries
            .list(tenant_id)
            .into_iter()
            .filter(|e| journal_code.is_none_or(|j| same_code(&e.journal_code, j)))
            .collect();
        entries.sort_by(|a, b| {
            b.entry_date
                .cmp(&a.entry_date)
                .then_with(|| b.entry_id.as_uuid().cmp(a.entry_id.as_uuid()))
        });
        entries
    }

    /// Movements of one account, most recent first.
    pub fn account_movements(&self, tenant_id: TenantId, account_id: BankAccountId) -> Vec<Movement> {
        let mut movements: Vec<_> = self
            .bank_movements
            .list(tenant_id)
            .into_iter()
            .filter(|m| m.account_id == account_id)
            .map(|m| m.movement)
            .collect();
        movements.sort_by(|a, b| {
            b.value_date
                .cmp(&a.value_date)
                .then_with(|| b.movement_id.as_uuid().cmp(a.movement_id.as_uuid()))
        });
        movements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use atelier_bank::MovementRecorded;
    use atelier_events::Event;

    fn movement(tenant_id: TenantId, account: AggregateId, seq: u64, day: u32, amount: i64) -> JsonEnvelope {
        let movement = Movement {
            movement_id: AggregateId::new(),
            value_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount,
            description: format!("movement {seq}"),
            reference: None,
            payment_id: None,
            invoice_id: None,
        };
        let event = BankAccountEvent::MovementRecorded(MovementRecorded {
            tenant_id,
            account_id: BankAccountId::new(account),
            movement,
            new_balance: 0,
            occurred_at: Utc::now(),
        });
        JsonEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            account,
            BANK_ACCOUNT_AGGREGATE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
        .with_event_type(event.event_type())
    }

    #[test]
    fn movements_are_kept_per_account_newest_first() {
        let models = ReadModels::new();
        let t = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());

        models.bank_movements.apply_envelope(&movement(t, a, 1, 1, 100)).unwrap();
        models.bank_movements.apply_envelope(&movement(t, a, 2, 9, -40)).unwrap();
        models.bank_movements.apply_envelope(&movement(t, b, 1, 5, 7)).unwrap();

        let of_a = models.account_movements(t, BankAccountId::new(a));
        assert_eq!(of_a.iter().map(|m| m.amount).collect::<Vec<_>>(), vec![-40, 100]);
        assert_eq!(models.account_movements(t, BankAccountId::new(b)).len(), 1);
        assert!(models.account_movements(TenantId::new(), BankAccountId::new(a)).is_empty());
    }

    #[test]
    fn replayed_rows_are_not_duplicated() {
        let models = ReadModels::new();
        let t = TenantId::new();
        let a = AggregateId::new();
        let first = movement(t, a, 1, 1, 100);

        models.bank_movements.apply_envelope(&first).unwrap();
        models.bank_movements.apply_envelope(&first).unwrap();
        assert_eq!(models.bank_movements.list(t).len(), 1);

        let gap = movement(t, a, 3, 2, 5);
        assert!(matches!(
            models.bank_movements.apply_envelope(&gap),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
    }
}
