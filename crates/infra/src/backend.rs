//! Everything a process needs to serve one Atelier deployment: the command
//! pipeline, the read models it keeps current, and the record services.
//!
//! Read models are updated inline after every commit, so a caller that wrote
//! something can read it back on its next request. The bus still carries every
//! envelope for asynchronous consumers such as automation.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{info, instrument, warn};

use atelier_bank::{BANK_ACCOUNT_AGGREGATE, BankAccount, BankAccountCommand, BankAccountId, Movement, RecordMovement};
use atelier_core::numbering::next_reference;
use atelier_core::{Aggregate, AggregateId, DomainError, TenantId};
use atelier_events::{Event, InMemoryEventBus, JsonEnvelope};
use atelier_ged::DocumentStorage;
use atelier_invoicing::{INVOICE_AGGREGATE, Invoice, InvoiceCommand, InvoiceId, InvoiceKind, RegisterPayment};
use atelier_automation::RuleEngine;

use crate::automation::AutomationWorker;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::{AppConfig, StorageMode};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent};
use crate::projections::{ProjectionError, ReadModels};
use crate::records::{
    Dictionaries, HrReference, ModuleSettings, NocodeRegistry, RecordBackend, RuleRepository, StoredOutbox,
    TenantDirectory, TenantRunStore, migrate_records,
};
use crate::storage::{FsDocumentStorage, InMemoryDocumentStorage};
use crate::workers::WorkerHandle;

pub type SharedEventStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<JsonEnvelope>>;
pub type Dispatcher = CommandDispatcher<SharedEventStore, SharedBus>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("DATABASE_URL is required for postgres storage")]
    MissingDatabaseUrl,

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Document families numbered `<PREFIX>-00001` per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Proposal,
    Order,
    SalesInvoice,
    PurchaseInvoice,
    Ticket,
}

impl ReferenceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ReferenceKind::Proposal => "PRO",
            ReferenceKind::Order => "ORD",
            ReferenceKind::SalesInvoice => InvoiceKind::Sales.prefix(),
            ReferenceKind::PurchaseInvoice => InvoiceKind::Purchase.prefix(),
            ReferenceKind::Ticket => "TCK",
        }
    }
}

#[derive(Clone)]
pub struct Backend {
    dispatcher: Arc<Dispatcher>,
    apply_lock: Arc<Mutex<()>>,
    pub read: Arc<ReadModels>,
    pub tenants: TenantDirectory,
    pub dictionaries: Dictionaries,
    pub modules: ModuleSettings,
    pub rules: RuleRepository,
    pub outbox: StoredOutbox,
    pub hr: HrReference,
    pub nocode: NocodeRegistry,
    pub import_runs: TenantRunStore,
    pub documents: Arc<dyn DocumentStorage>,
}

impl Backend {
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            RecordBackend::Memory,
            Arc::new(InMemoryDocumentStorage::new()),
        )
    }

    pub fn new(events: SharedEventStore, records: RecordBackend, documents: Arc<dyn DocumentStorage>) -> Self {
        let dictionaries = Dictionaries::new(&records);
        let modules = ModuleSettings::new(&records);
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(events, Arc::new(InMemoryEventBus::new()))),
            apply_lock: Arc::new(Mutex::new(())),
            read: Arc::new(ReadModels::new()),
            tenants: TenantDirectory::new(&records, dictionaries.clone(), modules.clone()),
            rules: RuleRepository::new(&records),
            outbox: StoredOutbox::new(&records),
            hr: HrReference::new(&records),
            nocode: NocodeRegistry::new(&records, modules.clone()),
            import_runs: TenantRunStore::new(&records),
            dictionaries,
            modules,
            documents,
        }
    }

    /// Builds the backend `config` asks for. Postgres storage migrates both
    /// schemas and rebuilds every read model from the event log.
    pub async fn connect(config: &AppConfig) -> Result<Self, BackendError> {
        let documents: Arc<dyn DocumentStorage> = Arc::new(FsDocumentStorage::new(&config.ged_root));
        match config.storage {
            StorageMode::Memory => {
                info!("using in-memory storage");
                Ok(Self::new(Arc::new(InMemoryEventStore::new()), RecordBackend::Memory, documents))
            }
            StorageMode::Postgres => {
                let url = config.database_url.as_deref().ok_or(BackendError::MissingDatabaseUrl)?;
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;

                let events = PostgresEventStore::new(pool.clone());
                events.migrate().await?;
                migrate_records(&pool).await?;
                let history = events.fetch_all().await?;

                let backend = Self::new(Arc::new(events), RecordBackend::Postgres(pool), documents);
                backend.rebuild_from(&history)?;
                info!(events = history.len(), "postgres storage ready; read models rebuilt");
                Ok(backend)
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Rebuilds the read models from everything in the event store.
    pub fn rebuild(&self) -> Result<usize, BackendError> {
        let history = self.dispatcher.store().load_all()?;
        self.rebuild_from(&history)?;
        Ok(history.len())
    }

    fn rebuild_from(&self, history: &[StoredEvent]) -> Result<(), BackendError> {
        let envelopes: Vec<_> = history.iter().map(StoredEvent::to_envelope).collect();
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read.rebuild(&envelopes)?;
        Ok(())
    }

    /// Dispatches `command` and folds the committed events into the read models.
    pub fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .dispatcher
            .dispatch(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        self.project(&committed);
        Ok(committed)
    }

    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.dispatcher.load(tenant_id, aggregate_id, make_aggregate)
    }

    fn project(&self, committed: &[StoredEvent]) {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        for stored in committed {
            match self.read.apply(&stored.to_envelope()) {
                Ok(()) => {}
                // A concurrent commit to the same stream landed out of order.
                Err(ProjectionError::NonMonotonicSequence { .. }) => {
                    self.catch_up(stored.tenant_id, stored.aggregate_id);
                }
                Err(err) => warn!(error = %err, event_type = %stored.event_type, "read model update failed"),
            }
        }
    }

    fn catch_up(&self, tenant_id: TenantId, aggregate_id: AggregateId) {
        let stream = match self.dispatcher.store().load_stream(tenant_id, aggregate_id) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, aggregate_id = %aggregate_id, "could not reload stream for read models");
                return;
            }
        };
        for stored in &stream {
            if let Err(err) = self.read.apply(&stored.to_envelope()) {
                warn!(error = %err, aggregate_id = %aggregate_id, "read model catch-up failed");
                return;
            }
        }
    }

    /// Records a payment on an invoice. When the payment names a bank account
    /// the matching movement is booked too: money in for sales invoices, money
    /// out for supplier bills.
    #[instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id, invoice_id = %cmd.invoice_id.0), err)]
    pub fn register_payment(&self, cmd: RegisterPayment) -> Result<Vec<StoredEvent>, DispatchError> {
        let tenant_id = cmd.tenant_id;
        let invoice = self
            .read
            .invoices
            .get(tenant_id, cmd.invoice_id.0)
            .ok_or_else(DomainError::not_found)?;

        let account = match cmd.bank_account_id {
            Some(account_id) => {
                let account = self
                    .read
                    .bank_accounts
                    .get(tenant_id, account_id)
                    .ok_or_else(|| DomainError::validation("unknown bank account"))?;
                if !account.is_active() {
                    return Err(DomainError::invariant("bank account is closed").into());
                }
                Some(account_id)
            }
            None => None,
        };

        let movement = account.map(|account_id| {
            let amount = match invoice.kind() {
                InvoiceKind::Sales => cmd.amount,
                InvoiceKind::Purchase => -cmd.amount,
            };
            RecordMovement {
                tenant_id,
                account_id: BankAccountId::new(account_id),
                movement: Movement {
                    movement_id: AggregateId::new(),
                    value_date: cmd.paid_on,
                    amount,
                    description: format!("Payment {}", invoice.reference()),
                    reference: cmd.reference.clone(),
                    payment_id: Some(cmd.payment_id.0),
                    invoice_id: Some(cmd.invoice_id.0),
                },
                occurred_at: cmd.occurred_at,
            }
        });

        let invoice_id = cmd.invoice_id.0;
        let mut committed = self.execute(
            tenant_id,
            invoice_id,
            INVOICE_AGGREGATE,
            InvoiceCommand::RegisterPayment(cmd),
            |id| Invoice::empty(InvoiceId::new(id)),
        )?;

        if let Some(movement) = movement {
            let account_id = movement.account_id.0;
            committed.extend(self.execute(
                tenant_id,
                account_id,
                BANK_ACCOUNT_AGGREGATE,
                BankAccountCommand::RecordMovement(movement),
                |id| BankAccount::empty(BankAccountId::new(id)),
            )?);
        }
        Ok(committed)
    }

    /// Next free reference of `kind` for the tenant (highest used plus one).
    pub fn next_reference(&self, tenant_id: TenantId, kind: ReferenceKind) -> String {
        let prefix = kind.prefix();
        match kind {
            ReferenceKind::Proposal => {
                let proposals = self.read.proposals.list(tenant_id);
                next_reference(prefix, proposals.iter().map(|p| p.reference()))
            }
            ReferenceKind::Order => {
                let orders = self.read.orders.list(tenant_id);
                next_reference(prefix, orders.iter().map(|o| o.reference()))
            }
            ReferenceKind::SalesInvoice | ReferenceKind::PurchaseInvoice => {
                let invoices = self.read.invoices.list(tenant_id);
                next_reference(prefix, invoices.iter().map(|i| i.reference()))
            }
            ReferenceKind::Ticket => {
                let tickets = self.read.tickets.list(tenant_id);
                next_reference(prefix, tickets.iter().map(|t| t.reference()))
            }
        }
    }

    pub fn rule_engine(&self) -> RuleEngine {
        RuleEngine::with_builtins(Arc::new(self.rules.clone()), Arc::new(self.outbox.clone()))
    }

    /// Starts the automation worker on this backend's bus.
    pub fn spawn_automation(&self) -> io::Result<WorkerHandle> {
        AutomationWorker::spawn(self.dispatcher.bus().clone(), Arc::new(self.rule_engine()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    use atelier_bank::OpenBankAccount;
    use atelier_invoicing::{CreateInvoice, InvoiceStatus, InvoiceTransition, PaymentId, PaymentMethod};
    use atelier_parties::ThirdPartyId;
    use atelier_sales::{LineInput, price_lines};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn validated_invoice(backend: &Backend, t: TenantId, kind: InvoiceKind) -> InvoiceId {
        let id = InvoiceId::new(AggregateId::new());
        let reference = backend.next_reference(
            t,
            match kind {
                InvoiceKind::Sales => ReferenceKind::SalesInvoice,
                InvoiceKind::Purchase => ReferenceKind::PurchaseInvoice,
            },
        );
        let lines = price_lines(&[LineInput {
            product_id: None,
            description: "Consulting".to_string(),
            quantity_milli: 2_000,
            unit_price: 50_000,
            discount_bps: 0,
            vat_rate_bps: 2_000,
        }])
        .unwrap();
        backend
            .execute(
                t,
                id.0,
                INVOICE_AGGREGATE,
                InvoiceCommand::Create(CreateInvoice {
                    tenant_id: t,
                    invoice_id: id,
                    kind,
                    reference,
                    third_party_id: ThirdPartyId::new(AggregateId::new()),
                    order_id: None,
                    issue_date: day(1),
                    due_date: None,
                    payment_terms_days: Some(30),
                    currency: "EUR".to_string(),
                    lines,
                    occurred_at: Utc::now(),
                }),
                |a| Invoice::empty(InvoiceId::new(a)),
            )
            .unwrap();
        backend
            .execute(
                t,
                id.0,
                INVOICE_AGGREGATE,
                InvoiceCommand::Validate(InvoiceTransition {
                    tenant_id: t,
                    invoice_id: id,
                    occurred_at: Utc::now(),
                }),
                |a| Invoice::empty(InvoiceId::new(a)),
            )
            .unwrap();
        id
    }

    fn open_account(backend: &Backend, t: TenantId) -> AggregateId {
        let id = AggregateId::new();
        backend
            .execute(
                t,
                id,
                BANK_ACCOUNT_AGGREGATE,
                BankAccountCommand::Open(OpenBankAccount {
                    tenant_id: t,
                    account_id: BankAccountId::new(id),
                    name: "Main".to_string(),
                    iban: None,
                    bic: None,
                    currency: None,
                    occurred_at: Utc::now(),
                }),
                |a| BankAccount::empty(BankAccountId::new(a)),
            )
            .unwrap();
        id
    }

    fn payment(t: TenantId, invoice: InvoiceId, amount: i64, bank: Option<AggregateId>) -> RegisterPayment {
        RegisterPayment {
            tenant_id: t,
            invoice_id: invoice,
            payment_id: PaymentId::new(AggregateId::new()),
            amount,
            paid_on: day(10),
            method: PaymentMethod::Bank,
            reference: Some("VIR-1".to_string()),
            bank_account_id: bank,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn commits_are_readable_immediately() {
        let backend = Backend::in_memory();
        let t = TenantId::new();
        let id = validated_invoice(&backend, t, InvoiceKind::Sales);

        let invoice = backend.read.invoices.get(t, id.0).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Validated);
        assert_eq!(invoice.reference(), "INV-00001");
        assert_eq!(backend.next_reference(t, ReferenceKind::SalesInvoice), "INV-00002");
        assert_eq!(backend.next_reference(t, ReferenceKind::PurchaseInvoice), "BIL-00001");
        assert_eq!(backend.next_reference(TenantId::new(), ReferenceKind::SalesInvoice), "INV-00001");
    }

    #[test]
    fn bank_payments_book_signed_movements() {
        let backend = Backend::in_memory();
        let t = TenantId::new();
        let account = open_account(&backend, t);
        let sale = validated_invoice(&backend, t, InvoiceKind::Sales);
        let bill = validated_invoice(&backend, t, InvoiceKind::Purchase);

        backend.register_payment(payment(t, sale, 30_000, Some(account))).unwrap();
        backend.register_payment(payment(t, bill, 10_000, Some(account))).unwrap();

        let bank = backend.read.bank_accounts.get(t, account).unwrap();
        assert_eq!(bank.balance(), 20_000);

        let movements = backend.read.account_movements(t, BankAccountId::new(account));
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().any(|m| m.amount == -10_000 && m.invoice_id == Some(bill.0)));
        assert!(movements.iter().all(|m| m.description.starts_with("Payment ")));

        let paid = backend.read.invoices.get(t, sale.0).unwrap();
        assert_eq!(paid.amount_paid(), 30_000);
    }

    #[test]
    fn unknown_bank_account_leaves_the_invoice_untouched() {
        let backend = Backend::in_memory();
        let t = TenantId::new();
        let sale = validated_invoice(&backend, t, InvoiceKind::Sales);

        let err = backend
            .register_payment(payment(t, sale, 1_000, Some(AggregateId::new())))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Validation(_))));
        assert_eq!(backend.read.invoices.get(t, sale.0).unwrap().amount_paid(), 0);

        backend.register_payment(payment(t, sale, 1_000, None)).unwrap();
        assert_eq!(backend.read.invoices.get(t, sale.0).unwrap().amount_paid(), 1_000);
    }

    #[test]
    fn rebuild_restores_the_same_state() {
        let backend = Backend::in_memory();
        let t = TenantId::new();
        let account = open_account(&backend, t);
        let sale = validated_invoice(&backend, t, InvoiceKind::Sales);
        backend.register_payment(payment(t, sale, 5_000, Some(account))).unwrap();

        let replayed = backend.rebuild().unwrap();
        assert_eq!(replayed, 5);
        assert_eq!(backend.read.bank_accounts.get(t, account).unwrap().balance(), 5_000);
        assert_eq!(backend.read.account_movements(t, BankAccountId::new(account)).len(), 1);
    }
}
