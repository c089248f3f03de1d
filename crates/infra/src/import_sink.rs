//! Lands Dolibarr import rows as ordinary commands, so imported records go
//! through the same aggregates, events and read models as everything else.

use chrono::Utc;

use atelier_catalog::{
    CATEGORY_AGGREGATE, Category, CategoryCommand, CategoryId, CreateCategory, CreateProduct, PRODUCT_AGGREGATE,
    Product, ProductCommand, ProductId,
};
use atelier_core::{AggregateRoot, TenantId};
use atelier_dolibarr::{ImportError, ImportSink};
use atelier_invoicing::{
    INVOICE_AGGREGATE, ImportInvoice, ImportPayment, Invoice, InvoiceCommand, InvoiceId, RegisterPayment,
};
use atelier_parties::{
    CONTACT_AGGREGATE, Contact, ContactCommand, ContactId, CreateContact, LinkThirdParty, RegisterThirdParty,
    THIRD_PARTY_AGGREGATE, ThirdParty, ThirdPartyCommand, ThirdPartyId,
};
use atelier_sales::{
    ImportProposal, ImportSalesOrder, PROPOSAL_AGGREGATE, Proposal, ProposalCommand, ProposalId,
    SALES_ORDER_AGGREGATE, SalesOrder, SalesOrderCommand, SalesOrderId,
};
use atelier_tenancy::{DictionaryType, NewDictionaryItem};

use crate::backend::Backend;
use crate::command_dispatcher::DispatchError;

#[derive(Clone)]
pub struct DispatchingImportSink {
    backend: Backend,
}

impl DispatchingImportSink {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

fn import_error(err: DispatchError) -> ImportError {
    match err {
        DispatchError::Domain(e) => ImportError::Domain(e),
        other => ImportError::Sink(other.to_string()),
    }
}

impl ImportSink for DispatchingImportSink {
    fn third_party_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ThirdPartyId> {
        self.backend.read.third_party_by_code(tenant_id, code).map(|t| *t.id())
    }

    fn create_third_party(&self, cmd: RegisterThirdParty) -> Result<ThirdPartyId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.third_party_id);
        self.backend
            .execute(tenant_id, id.0, THIRD_PARTY_AGGREGATE, ThirdPartyCommand::Register(cmd), |a| {
                ThirdParty::empty(ThirdPartyId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn create_contact(&self, cmd: CreateContact) -> Result<ContactId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.contact_id);
        self.backend
            .execute(tenant_id, id.0, CONTACT_AGGREGATE, ContactCommand::Create(cmd), |a| {
                Contact::empty(ContactId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn link_contact(&self, cmd: LinkThirdParty) -> Result<(), ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.contact_id);
        self.backend
            .execute(tenant_id, id.0, CONTACT_AGGREGATE, ContactCommand::Link(cmd), |a| {
                Contact::empty(ContactId::new(a))
            })
            .map_err(import_error)?;
        Ok(())
    }

    fn category_by_code(&self, tenant_id: TenantId, code: &str) -> Option<CategoryId> {
        self.backend.read.category_by_code(tenant_id, code).map(|c| *c.id())
    }

    fn create_category(&self, cmd: CreateCategory) -> Result<CategoryId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.category_id);
        self.backend
            .execute(tenant_id, id.0, CATEGORY_AGGREGATE, CategoryCommand::Create(cmd), |a| {
                Category::empty(CategoryId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn product_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ProductId> {
        self.backend.read.product_by_code(tenant_id, code).map(|p| *p.id())
    }

    fn create_product(&self, cmd: CreateProduct) -> Result<ProductId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.product_id);
        self.backend
            .execute(tenant_id, id.0, PRODUCT_AGGREGATE, ProductCommand::Create(cmd), |a| {
                Product::empty(ProductId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn proposal_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<ProposalId> {
        self.backend.read.proposal_by_reference(tenant_id, reference).map(|p| *p.id())
    }

    fn import_proposal(&self, cmd: ImportProposal) -> Result<ProposalId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.proposal_id);
        self.backend
            .execute(tenant_id, id.0, PROPOSAL_AGGREGATE, ProposalCommand::Import(cmd), |a| {
                Proposal::empty(ProposalId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn invoice_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<InvoiceId> {
        self.backend.read.invoice_by_reference(tenant_id, reference).map(|i| *i.id())
    }

    fn import_invoice(&self, cmd: ImportInvoice) -> Result<InvoiceId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.invoice_id);
        self.backend
            .execute(tenant_id, id.0, INVOICE_AGGREGATE, InvoiceCommand::Import(cmd), |a| {
                Invoice::empty(InvoiceId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn register_payment(&self, cmd: RegisterPayment) -> Result<(), ImportError> {
        self.backend.register_payment(cmd).map_err(import_error)?;
        Ok(())
    }

    fn import_payment(&self, cmd: ImportPayment) -> Result<(), ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.invoice_id);
        self.backend
            .execute(tenant_id, id.0, INVOICE_AGGREGATE, InvoiceCommand::ImportPayment(cmd), |a| {
                Invoice::empty(InvoiceId::new(a))
            })
            .map_err(import_error)?;
        Ok(())
    }

    fn order_by_reference(&self, tenant_id: TenantId, reference: &str) -> Option<SalesOrderId> {
        self.backend.read.order_by_reference(tenant_id, reference).map(|o| *o.id())
    }

    fn import_order(&self, cmd: ImportSalesOrder) -> Result<SalesOrderId, ImportError> {
        let (tenant_id, id) = (cmd.tenant_id, cmd.order_id);
        self.backend
            .execute(tenant_id, id.0, SALES_ORDER_AGGREGATE, SalesOrderCommand::Import(cmd), |a| {
                SalesOrder::empty(SalesOrderId::new(a))
            })
            .map_err(import_error)?;
        Ok(id)
    }

    fn upsert_dictionary_item(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        item: NewDictionaryItem,
    ) -> Result<(), ImportError> {
        self.backend
            .dictionaries
            .create_or_update(tenant_id, dictionary_type, &item, Utc::now())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::AggregateId;
    use atelier_parties::ThirdPartyDetails;
    use atelier_tenancy::CurrentTenant;

    fn register(tenant_id: TenantId, code: &str) -> RegisterThirdParty {
        RegisterThirdParty {
            tenant_id,
            third_party_id: ThirdPartyId::new(AggregateId::new()),
            code: code.to_string(),
            name: format!("Company {code}"),
            customer: true,
            supplier: false,
            prospect: false,
            details: ThirdPartyDetails::default(),
            payment_terms_days: None,
            credit_limit: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn created_rows_are_found_by_code() {
        let sink = DispatchingImportSink::new(Backend::in_memory());
        let t = TenantId::new();

        let id = sink.create_third_party(register(t, "C0001")).unwrap();
        assert_eq!(sink.third_party_by_code(t, "c0001"), Some(id));
        assert_eq!(sink.third_party_by_code(TenantId::new(), "C0001"), None);
    }

    #[test]
    fn domain_rejections_surface_as_domain_errors() {
        let sink = DispatchingImportSink::new(Backend::in_memory());
        let t = TenantId::new();
        let mut cmd = register(t, "C0002");
        cmd.name = "  ".to_string();

        assert!(matches!(sink.create_third_party(cmd), Err(ImportError::Domain(_))));
    }

    #[test]
    fn dictionary_upserts_need_the_tenant_context() {
        let sink = DispatchingImportSink::new(Backend::in_memory());
        let t = TenantId::new();
        let item = NewDictionaryItem {
            code: "EUR".to_string(),
            label: "Euro".to_string(),
            sort_order: None,
            active: None,
        };

        assert!(matches!(
            sink.upsert_dictionary_item(t, DictionaryType::Currency, item.clone()),
            Err(ImportError::Tenant(_))
        ));
        CurrentTenant::sync_scope(t, || sink.upsert_dictionary_item(t, DictionaryType::Currency, item)).unwrap();
    }
}
