use thiserror::Error;

use atelier_catalog::{CategoryId, CreateCategory, CreateProduct, ProductId};
use atelier_core::{DomainError, TenantId};
use atelier_invoicing::{ImportInvoice, ImportPayment, InvoiceId, RegisterPayment};
use atelier_parties::{ContactId, CreateContact, LinkThirdParty, RegisterThirdParty, ThirdPartyId};
use atelier_sales::{ImportProposal, ImportSalesOrder, ProposalId, SalesOrderId};
use atelier_tenancy::{DictionaryType, NewDictionaryItem, TenantContextError};

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Source(#[from] ClientError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Tenant(#[from] TenantContextError),

    #[error("write failed: {0}")]
    Sink(String),

    /// Run bookkeeping (runs, logs, mappings, staging, configuration) was not stored.
    #[error("import store failed: {0}")]
    Store(String),
}

/// Where imported rows land. Lookups see what earlier writes of the same run created.
pub trait ImportSink: Send + Sync {
    fn third_party_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ThirdPartyId>;
    fn create_third_party(&self, cmd: RegisterThirdParty) -> Result<ThirdPartyId, ImportError>;

    fn create_contact(&self, cmd: CreateContact) -> Result<ContactId, ImportError>;
    fn link_contact(&self, cmd: LinkThirdParty) -> Result<(), ImportError>;

    fn category_by_code(&self, tenant_id: TenantId, code: &str) -> Option<CategoryId>;
    fn create_category(&self, cmd: CreateCategory) -> Result<CategoryId, ImportError>;

    fn product_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ProductId>;
    fn create_product(&self, cmd: CreateProduct) -> Result<ProductId, ImportError>;

    fn proposal_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<ProposalId>;
    fn import_proposal(&self, cmd: ImportProposal) -> Result<ProposalId, ImportError>;

    fn invoice_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<InvoiceId>;
    fn import_invoice(&self, cmd: ImportInvoice) -> Result<InvoiceId, ImportError>;
    fn register_payment(&self, cmd: RegisterPayment) -> Result<(), ImportError>;
    /// Payment row kept as history on an invoice whose paid amount already covers it.
    fn import_payment(&self, cmd: ImportPayment) -> Result<(), ImportError>;

    fn order_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<SalesOrderId>;
    fn import_order(&self, cmd: ImportSalesOrder) -> Result<SalesOrderId, ImportError>;

    fn upsert_dictionary_item(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        item: NewDictionaryItem,
    ) -> Result<(), ImportError>;
}
