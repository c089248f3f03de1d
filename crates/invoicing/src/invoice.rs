use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;
use atelier_parties::{DEFAULT_PAYMENT_TERMS_DAYS, ThirdPartyId};
use atelier_sales::{DocumentLine, DocumentTotals, LineInput, SalesOrderId, next_line_no};

pub const INVOICE_AGGREGATE: &str = "invoicing.invoice";

/// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

/// Customer invoice or supplier bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    #[default]
    Sales,
    Purchase,
}

impl InvoiceKind {
    /// Reference prefix used by numbering.
    pub fn prefix(self) -> &'static str {
        match self {
            InvoiceKind::Sales => "INV",
            InvoiceKind::Purchase => "BIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Validated,
    Sent,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "validated" => Some(Self::Validated),
            "sent" => Some(Self::Sent),
            "partially_paid" => Some(Self::PartiallyPaid),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Bank,
    Cash,
    Card,
    Cheque,
    Other,
}

impl PaymentMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bank" | "transfer" | "vir" => Some(Self::Bank),
            "cash" | "liq" => Some(Self::Cash),
            "card" | "cb" => Some(Self::Card),
            "cheque" | "check" | "chq" => Some(Self::Cheque),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    kind: InvoiceKind,
    reference: String,
    third_party_id: Option<ThirdPartyId>,
    order_id: Option<SalesOrderId>,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    currency: String,
    lines: Vec<DocumentLine>,
    totals: DocumentTotals,
    amount_paid: i64,
    payments: Vec<Payment>,
    status: InvoiceStatus,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: InvoiceKind::Sales,
            reference: String::new(),
            third_party_id: None,
            order_id: None,
            issue_date: None,
            due_date: None,
            currency: String::new(),
            lines: Vec::new(),
            totals: DocumentTotals::default(),
            amount_paid: 0,
            payments: Vec::new(),
            status: InvoiceStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn third_party_id(&self) -> Option<ThirdPartyId> {
        self.third_party_id
    }

    pub fn order_id(&self) -> Option<SalesOrderId> {
        self.order_id
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn totals(&self) -> DocumentTotals {
        self.totals
    }

    pub fn amount_paid(&self) -> i64 {
        self.amount_paid
    }

    pub fn amount_remaining(&self) -> i64 {
        self.totals.total - self.amount_paid
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Past its due date with money still owed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        is_overdue(self.due_date, self.amount_remaining(), self.status, today)
    }
}

/// Shared by the aggregate and the read model.
pub fn is_overdue(due_date: Option<NaiveDate>, remaining: i64, status: InvoiceStatus, today: NaiveDate) -> bool {
    !matches!(status, InvoiceStatus::Cancelled | InvoiceStatus::Draft)
        && remaining > 0
        && due_date.is_some_and(|d| d < today)
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub kind: InvoiceKind,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub order_id: Option<SalesOrderId>,
    pub issue_date: NaiveDate,
    /// Defaults to `issue_date + payment_terms_days`.
    pub due_date: Option<NaiveDate>,
    pub payment_terms_days: Option<u32>,
    pub currency: String,
    /// Lines copied from an order, if any.
    #[serde(default)]
    pub lines: Vec<DocumentLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddInvoiceLine {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line: LineInput,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveInvoiceLine {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInvoiceDiscount {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub discount_amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInvoiceHeader {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTransition {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    /// Minor units.
    pub amount: i64,
    pub paid_on: NaiveDate,
    #[serde(default)]
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// When set, a matching bank movement is recorded by the application layer.
    #[serde(default)]
    pub bank_account_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Payment row from the source system kept as history. The invoice's paid
/// amount already accounts for it and does not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub paid_on: NaiveDate,
    #[serde(default)]
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Historical invoice: status and amounts come from the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub kind: InvoiceKind,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub status: InvoiceStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub amount_paid: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Create(CreateInvoice),
    AddLine(AddInvoiceLine),
    RemoveLine(RemoveInvoiceLine),
    SetDiscount(SetInvoiceDiscount),
    UpdateHeader(UpdateInvoiceHeader),
    Validate(InvoiceTransition),
    MarkSent(InvoiceTransition),
    RegisterPayment(RegisterPayment),
    Cancel(InvoiceTransition),
    Import(ImportInvoice),
    ImportPayment(ImportPayment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub kind: InvoiceKind,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub order_id: Option<SalesOrderId>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLinesChanged {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeaderUpdated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Status change carrying the fields automation rules match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatusChanged {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub kind: InvoiceKind,
    pub reference: String,
    pub status: InvoiceStatus,
    pub third_party_id: ThirdPartyId,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub new_amount_paid: i64,
    pub status: InvoiceStatus,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub total: i64,
    #[serde(default)]
    pub bank_account_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentImported {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceImported {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub kind: InvoiceKind,
    pub reference: String,
    pub third_party_id: ThirdPartyId,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub status: InvoiceStatus,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub amount_paid: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    Created(InvoiceCreated),
    LinesChanged(InvoiceLinesChanged),
    HeaderUpdated(InvoiceHeaderUpdated),
    Validated(InvoiceStatusChanged),
    Sent(InvoiceStatusChanged),
    PaymentRegistered(PaymentRegistered),
    Cancelled(InvoiceStatusChanged),
    Imported(InvoiceImported),
    PaymentImported(PaymentImported),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Created(_) => "invoicing.invoice.created",
            InvoiceEvent::LinesChanged(_) => "invoicing.invoice.lines_changed",
            InvoiceEvent::HeaderUpdated(_) => "invoicing.invoice.header_updated",
            InvoiceEvent::Validated(_) => "invoicing.invoice.validated",
            InvoiceEvent::Sent(_) => "invoicing.invoice.sent",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::Cancelled(_) => "invoicing.invoice.cancelled",
            InvoiceEvent::Imported(_) => "invoicing.invoice.imported",
            InvoiceEvent::PaymentImported(_) => "invoicing.invoice.payment_imported",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Created(e) => e.occurred_at,
            InvoiceEvent::LinesChanged(e) => e.occurred_at,
            InvoiceEvent::HeaderUpdated(e) => e.occurred_at,
            InvoiceEvent::Validated(e) | InvoiceEvent::Sent(e) | InvoiceEvent::Cancelled(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::Imported(e) => e.occurred_at,
            InvoiceEvent::PaymentImported(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Created(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.reference = e.reference.clone();
                self.third_party_id = Some(e.third_party_id);
                self.order_id = e.order_id;
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.currency = e.currency.clone();
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.status = InvoiceStatus::Draft;
                self.created = true;
            }
            InvoiceEvent::LinesChanged(e) => {
                self.lines = e.lines.clone();
                self.totals = e.totals;
            }
            InvoiceEvent::HeaderUpdated(e) => {
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
            }
            InvoiceEvent::Validated(e) | InvoiceEvent::Sent(e) | InvoiceEvent::Cancelled(e) => {
                self.status = e.status;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.amount_paid = e.new_amount_paid;
                self.payments.push(e.payment.clone());
                self.status = e.status;
            }
            InvoiceEvent::Imported(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.reference = e.reference.clone();
                self.third_party_id = Some(e.third_party_id);
                self.issue_date = Some(e.issue_date);
                self.due_date = e.due_date;
                self.currency = e.currency.clone();
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.amount_paid = e.amount_paid;
                self.status = e.status;
                self.created = true;
            }
            InvoiceEvent::PaymentImported(e) => {
                self.payments.push(e.payment.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceCommand::AddLine(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.invoice_id)?;
                let mut lines = self.lines.clone();
                lines.push(DocumentLine::price(next_line_no(&lines), &cmd.line)?);
                self.lines_changed(cmd.tenant_id, lines, self.totals.discount_amount, cmd.occurred_at)
            }
            InvoiceCommand::RemoveLine(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.invoice_id)?;
                if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
                    return Err(DomainError::not_found());
                }
                let lines: Vec<_> = self.lines.iter().filter(|l| l.line_no != cmd.line_no).cloned().collect();
                let subtotal: i64 = lines.iter().map(|l| l.total).sum();
                let discount = self.totals.discount_amount.min(subtotal);
                self.lines_changed(cmd.tenant_id, lines, discount, cmd.occurred_at)
            }
            InvoiceCommand::SetDiscount(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.invoice_id)?;
                self.lines_changed(cmd.tenant_id, self.lines.clone(), cmd.discount_amount, cmd.occurred_at)
            }
            InvoiceCommand::UpdateHeader(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.invoice_id)?;
                let issue_date = cmd.issue_date.or(self.issue_date).ok_or_else(DomainError::not_found)?;
                let due_date = cmd.due_date.or(self.due_date).ok_or_else(DomainError::not_found)?;
                check_due(issue_date, due_date)?;
                Ok(vec![InvoiceEvent::HeaderUpdated(InvoiceHeaderUpdated {
                    tenant_id: cmd.tenant_id,
                    invoice_id: cmd.invoice_id,
                    issue_date,
                    due_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            InvoiceCommand::Validate(cmd) => {
                self.ensure_draft(cmd.tenant_id, cmd.invoice_id)?;
                if self.lines.is_empty() {
                    return Err(DomainError::invariant("cannot validate an invoice without lines"));
                }
                Ok(vec![InvoiceEvent::Validated(self.status_changed(cmd, InvoiceStatus::Validated)?)])
            }
            InvoiceCommand::MarkSent(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
                if self.status != InvoiceStatus::Validated {
                    return Err(DomainError::invariant("only validated invoices can be sent"));
                }
                Ok(vec![InvoiceEvent::Sent(self.status_changed(cmd, InvoiceStatus::Sent)?)])
            }
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::Cancel(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
                match self.status {
                    InvoiceStatus::Cancelled => return Err(DomainError::conflict("invoice is already cancelled")),
                    InvoiceStatus::Paid => return Err(DomainError::invariant("paid invoices cannot be cancelled")),
                    _ => {}
                }
                if self.amount_paid > 0 {
                    return Err(DomainError::invariant("invoices with payments cannot be cancelled"));
                }
                Ok(vec![InvoiceEvent::Cancelled(self.status_changed(cmd, InvoiceStatus::Cancelled)?)])
            }
            InvoiceCommand::Import(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("invoice already exists"));
                }
                Ok(vec![InvoiceEvent::Imported(InvoiceImported {
                    tenant_id: cmd.tenant_id,
                    invoice_id: cmd.invoice_id,
                    kind: cmd.kind,
                    reference: required_text(&cmd.reference, "reference")?,
                    third_party_id: cmd.third_party_id,
                    issue_date: cmd.issue_date,
                    due_date: cmd.due_date,
                    currency: cmd.currency.clone(),
                    status: cmd.status,
                    lines: cmd.lines.clone(),
                    totals: cmd.totals,
                    amount_paid: cmd.amount_paid,
                    occurred_at: cmd.occurred_at,
                })])
            }
            InvoiceCommand::ImportPayment(cmd) => self.handle_import_payment(cmd),
        }
    }
}

fn check_due(issue_date: NaiveDate, due_date: NaiveDate) -> Result<(), DomainError> {
    if due_date < issue_date {
        return Err(DomainError::validation("due date cannot precede the issue date"));
    }
    Ok(())
}

impl Invoice {
    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be modified"));
        }
        Ok(())
    }

    fn third_party(&self) -> Result<ThirdPartyId, DomainError> {
        self.third_party_id.ok_or_else(DomainError::not_found)
    }

    fn status_changed(
        &self,
        cmd: &InvoiceTransition,
        status: InvoiceStatus,
    ) -> Result<InvoiceStatusChanged, DomainError> {
        Ok(InvoiceStatusChanged {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            kind: self.kind,
            reference: self.reference.clone(),
            status,
            third_party_id: self.third_party()?,
            total: self.totals.total,
            occurred_at: cmd.occurred_at,
        })
    }

    fn lines_changed(
        &self,
        tenant_id: TenantId,
        lines: Vec<DocumentLine>,
        discount_amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        let totals = DocumentTotals::compute(&lines, discount_amount)?;
        Ok(vec![InvoiceEvent::LinesChanged(InvoiceLinesChanged {
            tenant_id,
            invoice_id: self.id,
            lines,
            totals,
            occurred_at,
        })])
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        let terms = cmd.payment_terms_days.unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS);
        let due_date = match cmd.due_date {
            Some(d) => d,
            None => cmd
                .issue_date
                .checked_add_days(Days::new(u64::from(terms)))
                .ok_or_else(|| DomainError::validation("due date out of range"))?,
        };
        check_due(cmd.issue_date, due_date)?;
        let currency = cmd.currency.trim().to_uppercase();
        if currency.len() != 3 {
            return Err(DomainError::validation("currency must be a 3-letter ISO code"));
        }
        let totals = DocumentTotals::compute(&cmd.lines, 0)?;

        Ok(vec![InvoiceEvent::Created(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            kind: cmd.kind,
            reference: required_text(&cmd.reference, "reference")?,
            third_party_id: cmd.third_party_id,
            order_id: cmd.order_id,
            issue_date: cmd.issue_date,
            due_date,
            currency,
            lines: cmd.lines.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(&self, cmd: &RegisterPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;

        if matches!(self.status, InvoiceStatus::Draft | InvoiceStatus::Cancelled) {
            return Err(DomainError::invariant(
                "cannot register payment on draft or cancelled invoice",
            ));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self.payments.iter().any(|p| p.payment_id == cmd.payment_id) {
            return Err(DomainError::conflict("payment already registered"));
        }

        let new_amount_paid = self
            .amount_paid
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        if new_amount_paid > self.totals.total {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }
        let status = if self.totals.total - new_amount_paid <= 0 {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                payment_id: cmd.payment_id,
                amount: cmd.amount,
                paid_on: cmd.paid_on,
                method: cmd.method,
                reference: optional_text(cmd.reference.as_deref()),
            },
            new_amount_paid,
            status,
            reference: self.reference.clone(),
            third_party_id: self.third_party()?,
            total: self.totals.total,
            bank_account_id: cmd.bank_account_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// The same row seen twice (same id, or same reference, date and amount)
    /// is a conflict, and the history may never add up to more than was paid.
    fn handle_import_payment(&self, cmd: &ImportPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if self.status == InvoiceStatus::Draft {
            return Err(DomainError::invariant("draft invoices have no payment history"));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        let reference = optional_text(cmd.reference.as_deref());
        let seen = self.payments.iter().any(|p| {
            p.payment_id == cmd.payment_id
                || (p.reference == reference && p.paid_on == cmd.paid_on && p.amount == cmd.amount)
        });
        if seen {
            return Err(DomainError::conflict("payment already recorded"));
        }

        let recorded = self
            .payments
            .iter()
            .try_fold(cmd.amount, |sum, p| sum.checked_add(p.amount))
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        if recorded > self.amount_paid {
            return Err(DomainError::invariant("payment history exceeds the amount paid"));
        }

        Ok(vec![InvoiceEvent::PaymentImported(PaymentImported {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                payment_id: cmd.payment_id,
                amount: cmd.amount,
                paid_on: cmd.paid_on,
                method: cmd.method,
                reference,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;
    use atelier_sales::price_lines;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn line(unit_price: i64) -> LineInput {
        LineInput {
            product_id: None,
            description: "Design work".to_string(),
            quantity_milli: 1_000,
            unit_price,
            discount_bps: 0,
            vat_rate_bps: 2_000,
        }
    }

    struct Fixture {
        invoice: Invoice,
        tenant_id: TenantId,
        id: InvoiceId,
    }

    impl Fixture {
        /// Draft sales invoice with a single 100.00 + 20% VAT line.
        fn draft() -> Self {
            let tenant_id = test_tenant_id();
            let id = InvoiceId::new(AggregateId::new());
            let mut invoice = Invoice::empty(id);
            execute(
                &mut invoice,
                &InvoiceCommand::Create(CreateInvoice {
                    tenant_id,
                    invoice_id: id,
                    kind: InvoiceKind::Sales,
                    reference: "INV-00001".to_string(),
                    third_party_id: ThirdPartyId::new(AggregateId::new()),
                    order_id: None,
                    issue_date: date(3, 1),
                    due_date: None,
                    payment_terms_days: None,
                    currency: "EUR".to_string(),
                    lines: price_lines(&[line(10_000)]).unwrap(),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self { invoice, tenant_id, id }
        }

        fn validated() -> Self {
            let mut f = Self::draft();
            f.run(InvoiceCommand::Validate(f.transition())).unwrap();
            f
        }

        fn transition(&self) -> InvoiceTransition {
            InvoiceTransition {
                tenant_id: self.tenant_id,
                invoice_id: self.id,
                occurred_at: test_time(),
            }
        }

        fn pay(&self, amount: i64) -> InvoiceCommand {
            InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id: self.tenant_id,
                invoice_id: self.id,
                payment_id: PaymentId::new(AggregateId::new()),
                amount,
                paid_on: date(3, 10),
                method: PaymentMethod::default(),
                reference: None,
                bank_account_id: None,
                occurred_at: test_time(),
            })
        }

        fn run(&mut self, cmd: InvoiceCommand) -> Result<Vec<InvoiceEvent>, DomainError> {
            execute(&mut self.invoice, &cmd)
        }
    }

    #[test]
    fn due_date_defaults_to_thirty_days() {
        let f = Fixture::draft();
        assert_eq!(f.invoice.due_date(), Some(date(3, 31)));
        assert_eq!(f.invoice.totals().total, 12_000);
        assert_eq!(f.invoice.status(), InvoiceStatus::Draft);
    }

    #[test]
    fn validated_event_carries_snapshot() {
        let mut f = Fixture::draft();
        let events = f.run(InvoiceCommand::Validate(f.transition())).unwrap();
        match &events[0] {
            InvoiceEvent::Validated(e) => {
                assert_eq!(e.status, InvoiceStatus::Validated);
                assert_eq!(e.total, 12_000);
                assert_eq!(e.reference, "INV-00001");
            }
            other => panic!("Expected Validated event, got {other:?}"),
        }
        assert_eq!(events[0].event_type(), "invoicing.invoice.validated");
    }

    #[test]
    fn only_drafts_can_be_modified() {
        let mut f = Fixture::validated();
        let cmd = InvoiceCommand::AddLine(AddInvoiceLine {
            tenant_id: f.tenant_id,
            invoice_id: f.id,
            line: line(1),
            occurred_at: test_time(),
        });
        match f.run(cmd) {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("only draft invoices can be modified") => {}
            other => panic!("Expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn draft_invoice_cannot_be_paid() {
        let mut f = Fixture::draft();
        let cmd = f.pay(100);
        assert!(matches!(f.run(cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn cannot_overpay_invoice() {
        let mut f = Fixture::validated();
        let cmd = f.pay(12_001);
        match f.run(cmd) {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("cannot overpay invoice") => {}
            other => panic!("Expected InvariantViolation for overpaying invoice, got {other:?}"),
        }
    }

    #[test]
    fn partial_then_full_payment() {
        let mut f = Fixture::validated();
        let first = f.pay(2_000);
        f.run(first).unwrap();
        assert_eq!(f.invoice.status(), InvoiceStatus::PartiallyPaid);
        assert_eq!(f.invoice.amount_remaining(), 10_000);
        assert!(f.invoice.is_overdue(date(4, 1)));
        assert!(!f.invoice.is_overdue(date(3, 31)));

        let second = f.pay(10_000);
        f.run(second).unwrap();
        assert_eq!(f.invoice.status(), InvoiceStatus::Paid);
        assert_eq!(f.invoice.payments().len(), 2);
        assert!(!f.invoice.is_overdue(date(12, 1)));
    }

    #[test]
    fn paid_or_partially_paid_invoice_cannot_be_cancelled() {
        let mut f = Fixture::validated();
        let pay = f.pay(1);
        f.run(pay).unwrap();
        assert!(matches!(
            f.run(InvoiceCommand::Cancel(f.transition())),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn cancelled_invoice_refuses_payment() {
        let mut f = Fixture::validated();
        f.run(InvoiceCommand::Cancel(f.transition())).unwrap();
        let pay = f.pay(100);
        assert!(matches!(f.run(pay), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn send_requires_validation() {
        let mut f = Fixture::draft();
        assert!(matches!(
            f.run(InvoiceCommand::MarkSent(f.transition())),
            Err(DomainError::InvariantViolation(_))
        ));
        f.run(InvoiceCommand::Validate(f.transition())).unwrap();
        f.run(InvoiceCommand::MarkSent(f.transition())).unwrap();
        assert_eq!(f.invoice.status(), InvoiceStatus::Sent);
    }

    fn imported(status: InvoiceStatus, total: i64, amount_paid: i64) -> Fixture {
        let tenant_id = test_tenant_id();
        let id = InvoiceId::new(AggregateId::new());
        let mut invoice = Invoice::empty(id);
        execute(
            &mut invoice,
            &InvoiceCommand::Import(ImportInvoice {
                tenant_id,
                invoice_id: id,
                kind: InvoiceKind::Sales,
                reference: "FA2603-0001".to_string(),
                third_party_id: ThirdPartyId::new(AggregateId::new()),
                issue_date: date(3, 1),
                due_date: None,
                currency: "EUR".to_string(),
                status,
                lines: Vec::new(),
                totals: DocumentTotals {
                    total,
                    ..DocumentTotals::default()
                },
                amount_paid,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        Fixture { invoice, tenant_id, id }
    }

    fn history(f: &Fixture, amount: i64, reference: &str) -> InvoiceCommand {
        InvoiceCommand::ImportPayment(ImportPayment {
            tenant_id: f.tenant_id,
            invoice_id: f.id,
            payment_id: PaymentId::new(AggregateId::new()),
            amount,
            paid_on: date(3, 15),
            method: PaymentMethod::Bank,
            reference: Some(reference.to_string()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn imported_payments_are_history_only() {
        let mut f = imported(InvoiceStatus::Paid, 12_000, 12_000);
        let first = history(&f, 5_000, "PAY-1");
        let events = f.run(first).unwrap();
        assert_eq!(events[0].event_type(), "invoicing.invoice.payment_imported");
        let second = history(&f, 7_000, "PAY-2");
        f.run(second).unwrap();

        assert_eq!(f.invoice.payments().len(), 2);
        assert_eq!(f.invoice.amount_paid(), 12_000);
        assert_eq!(f.invoice.status(), InvoiceStatus::Paid);

        let again = history(&f, 7_000, "PAY-2");
        assert!(matches!(f.run(again), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn payment_history_cannot_exceed_the_paid_amount() {
        let mut f = imported(InvoiceStatus::PartiallyPaid, 12_000, 4_000);
        let too_much = history(&f, 4_001, "PAY-1");
        match f.run(too_much) {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("exceeds the amount paid") => {}
            other => panic!("Expected InvariantViolation, got {other:?}"),
        }
        let partial = history(&f, 4_000, "PAY-1");
        f.run(partial).unwrap();
        assert_eq!(f.invoice.amount_remaining(), 8_000);
    }

    #[test]
    fn purchase_invoices_use_bill_prefix() {
        assert_eq!(InvoiceKind::Purchase.prefix(), "BIL");
        assert_eq!(InvoiceKind::Sales.prefix(), "INV");
    }
}
