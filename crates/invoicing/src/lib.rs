//! Invoicing domain module (event-sourced).
//!
//! Customer invoices, supplier bills and the payments registered against them,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod invoice;

pub use invoice::{
    AddInvoiceLine, CreateInvoice, INVOICE_AGGREGATE, ImportInvoice, ImportPayment, Invoice, InvoiceCommand,
    InvoiceCreated, InvoiceEvent, InvoiceHeaderUpdated, InvoiceId, InvoiceImported, InvoiceKind,
    InvoiceLinesChanged, InvoiceStatus, InvoiceStatusChanged, InvoiceTransition, Payment,
    PaymentId, PaymentImported, PaymentMethod, PaymentRegistered, RegisterPayment, RemoveInvoiceLine,
    SetInvoiceDiscount, UpdateInvoiceHeader, is_overdue,
};
