use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use atelier_catalog::{CategoryId, CreateCategory, CreateProduct, ProductId, ProductKind};
use atelier_core::{AggregateId, DomainError, TenantId};
use atelier_dolibarr::{
    ClientError, DolibarrSource, ImportConfig, ImportError, ImportLog, ImportMapping,
    ImportOrchestrator, ImportRun, ImportSink, LogLevel, RunStatus, RunStore, StagingRecord,
};
use atelier_invoicing::{ImportInvoice, ImportPayment, InvoiceId, InvoiceStatus, PaymentMethod, RegisterPayment};
use atelier_parties::{ContactId, CreateContact, LinkThirdParty, RegisterThirdParty, ThirdPartyId};
use atelier_sales::{ImportProposal, ImportSalesOrder, OrderStatus, ProposalId, ProposalStatus, SalesOrderId};
use atelier_tenancy::{CurrentTenant, DictionaryType, NewDictionaryItem};

#[derive(Default)]
struct FakeSource {
    resources: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
}

impl FakeSource {
    fn with(mut self, resource: &str, items: Value) -> Self {
        let items = items.as_array().cloned().unwrap_or_default();
        self.resources.insert(resource.to_string(), items);
        self
    }

    fn failing(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }
}

#[async_trait]
impl DolibarrSource for FakeSource {
    async fn get_list(&self, resource: &str, _params: &[(&str, &str)]) -> Result<Vec<Value>, ClientError> {
        if self.failing.contains(resource) {
            return Err(ClientError::Status {
                resource: resource.to_string(),
                status: 500,
            });
        }
        Ok(self.resources.get(resource).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct Written {
    third_parties: Vec<RegisterThirdParty>,
    contacts: Vec<CreateContact>,
    links: Vec<LinkThirdParty>,
    categories: Vec<CreateCategory>,
    products: Vec<CreateProduct>,
    proposals: Vec<ImportProposal>,
    invoices: Vec<ImportInvoice>,
    payments: Vec<RegisterPayment>,
    history: Vec<ImportPayment>,
    orders: Vec<ImportSalesOrder>,
    dictionary: Vec<(DictionaryType, NewDictionaryItem)>,
}

#[derive(Default)]
struct FakeSink {
    written: Mutex<Written>,
}

fn in_scope(tenant_id: TenantId) -> Result<(), ImportError> {
    Ok(CurrentTenant::ensure(tenant_id)?)
}

impl ImportSink for FakeSink {
    fn third_party_by_code(&self, _tenant_id: TenantId, code: &str) -> Option<ThirdPartyId> {
        let w = self.written.lock().unwrap();
        w.third_parties.iter().find(|t| t.code == code).map(|t| t.third_party_id)
    }

    fn create_third_party(&self, cmd: RegisterThirdParty) -> Result<ThirdPartyId, ImportError> {
        in_scope(cmd.tenant_id)?;
        let id = cmd.third_party_id;
        self.written.lock().unwrap().third_parties.push(cmd);
        Ok(id)
    }

    fn create_contact(&self, cmd: CreateContact) -> Result<ContactId, ImportError> {
        let id = cmd.contact_id;
        self.written.lock().unwrap().contacts.push(cmd);
        Ok(id)
    }

    fn link_contact(&self, cmd: LinkThirdParty) -> Result<(), ImportError> {
        self.written.lock().unwrap().links.push(cmd);
        Ok(())
    }

    fn category_by_code(&self, _tenant_id: TenantId, code: &str) -> Option<CategoryId> {
        let w = self.written.lock().unwrap();
        w.categories.iter().find(|c| c.code == code).map(|c| c.category_id)
    }

    fn create_category(&self, cmd: CreateCategory) -> Result<CategoryId, ImportError> {
        let id = cmd.category_id;
        self.written.lock().unwrap().categories.push(cmd);
        Ok(id)
    }

    fn product_by_code(&self, _tenant_id: TenantId, code: &str) -> Option<ProductId> {
        let w = self.written.lock().unwrap();
        w.products.iter().find(|p| p.code == code).map(|p| p.product_id)
    }

    fn create_product(&self, cmd: CreateProduct) -> Result<ProductId, ImportError> {
        let id = cmd.product_id;
        self.written.lock().unwrap().products.push(cmd);
        Ok(id)
    }

    fn proposal_by_reference(&self, _tenant_id: TenantId, reference: &str) -> Option<ProposalId> {
        let w = self.written.lock().unwrap();
        w.proposals.iter().find(|p| p.reference == reference).map(|p| p.proposal_id)
    }

    fn import_proposal(&self, cmd: ImportProposal) -> Result<ProposalId, ImportError> {
        let id = cmd.proposal_id;
        self.written.lock().unwrap().proposals.push(cmd);
        Ok(id)
    }

    fn invoice_by_reference(&self, _tenant_id: TenantId, reference: &str) -> Option<InvoiceId> {
        let w = self.written.lock().unwrap();
        w.invoices.iter().find(|i| i.reference == reference).map(|i| i.invoice_id)
    }

    fn import_invoice(&self, cmd: ImportInvoice) -> Result<InvoiceId, ImportError> {
        let id = cmd.invoice_id;
        self.written.lock().unwrap().invoices.push(cmd);
        Ok(id)
    }

    fn register_payment(&self, cmd: RegisterPayment) -> Result<(), ImportError> {
        self.written.lock().unwrap().payments.push(cmd);
        Ok(())
    }

    fn import_payment(&self, cmd: ImportPayment) -> Result<(), ImportError> {
        let mut w = self.written.lock().unwrap();
        let seen = w
            .payments
            .iter()
            .map(|p| (p.invoice_id, &p.reference))
            .chain(w.history.iter().map(|p| (p.invoice_id, &p.reference)))
            .any(|(id, reference)| id == cmd.invoice_id && *reference == cmd.reference);
        if seen {
            return Err(DomainError::conflict("payment already recorded").into());
        }
        w.history.push(cmd);
        Ok(())
    }

    fn order_by_reference(&self, _tenant_id: TenantId, reference: &str) -> Option<SalesOrderId> {
        let w = self.written.lock().unwrap();
        w.orders.iter().find(|o| o.reference == reference).map(|o| o.order_id)
    }

    fn import_order(&self, cmd: ImportSalesOrder) -> Result<SalesOrderId, ImportError> {
        let id = cmd.order_id;
        self.written.lock().unwrap().orders.push(cmd);
        Ok(id)
    }

    fn upsert_dictionary_item(
        &self,
        tenant_id: TenantId,
        dictionary_type: DictionaryType,
        item: NewDictionaryItem,
    ) -> Result<(), ImportError> {
        in_scope(tenant_id)?;
        self.written.lock().unwrap().dictionary.push((dictionary_type, item));
        Ok(())
    }
}

#[derive(Default)]
struct Books {
    runs: Vec<ImportRun>,
    logs: Vec<ImportLog>,
    mappings: Vec<ImportMapping>,
    staging: Vec<StagingRecord>,
    config: Option<ImportConfig>,
}

#[derive(Default)]
struct FakeRuns {
    books: Mutex<Books>,
    unwritable_mappings: bool,
}

impl RunStore for FakeRuns {
    fn save_run(&self, run: &ImportRun) -> Result<(), ImportError> {
        let mut b = self.books.lock().unwrap();
        b.runs.retain(|r| r.id != run.id);
        b.runs.push(run.clone());
        Ok(())
    }

    fn get_run(&self, tenant_id: TenantId, run_id: Uuid) -> Option<ImportRun> {
        let b = self.books.lock().unwrap();
        b.runs.iter().find(|r| r.id == run_id && r.tenant_id == tenant_id).cloned()
    }

    fn list_runs(&self, tenant_id: TenantId) -> Vec<ImportRun> {
        let b = self.books.lock().unwrap();
        let mut runs: Vec<_> = b.runs.iter().filter(|r| r.tenant_id == tenant_id).cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    fn append_log(&self, _tenant_id: TenantId, log: ImportLog) -> Result<(), ImportError> {
        self.books.lock().unwrap().logs.push(log);
        Ok(())
    }

    fn logs(&self, _tenant_id: TenantId, run_id: Uuid) -> Vec<ImportLog> {
        let b = self.books.lock().unwrap();
        b.logs.iter().filter(|l| l.run_id == run_id).cloned().collect()
    }

    fn save_mapping(&self, _tenant_id: TenantId, mapping: ImportMapping) -> Result<(), ImportError> {
        if self.unwritable_mappings {
            return Err(ImportError::Store("mapping table is read-only".to_string()));
        }
        self.books.lock().unwrap().mappings.push(mapping);
        Ok(())
    }

    fn mappings(&self, _tenant_id: TenantId) -> Vec<ImportMapping> {
        self.books.lock().unwrap().mappings.clone()
    }

    fn save_staging(&self, _tenant_id: TenantId, record: StagingRecord) -> Result<(), ImportError> {
        self.books.lock().unwrap().staging.push(record);
        Ok(())
    }

    fn staging(&self, _tenant_id: TenantId, run_id: Uuid) -> Vec<StagingRecord> {
        let b = self.books.lock().unwrap();
        b.staging.iter().filter(|s| s.run_id == run_id).cloned().collect()
    }

    fn save_config(&self, _tenant_id: TenantId, config: ImportConfig) -> Result<(), ImportError> {
        self.books.lock().unwrap().config = Some(config);
        Ok(())
    }

    fn config(&self, _tenant_id: TenantId) -> Option<ImportConfig> {
        self.books.lock().unwrap().config.clone()
    }
}

fn config() -> ImportConfig {
    ImportConfig {
        id: Uuid::now_v7(),
        base_url: "https://erp.example.com".to_string(),
        api_key: "k".to_string(),
    }
}

fn dolibarr() -> FakeSource {
    FakeSource::default()
        .with("setup/dictionary/countries", json!([{"code": "FR", "label": "France"}, {"label": "no code"}]))
        .with(
            "thirdparties",
            json!([
                {"id": "1", "name": "Acme", "code_client": "cu01", "client": "3", "fournisseur": "0", "email": "not-an-email"},
                {"id": "2"}
            ]),
        )
        .with("contacts", json!([{"id": "10", "lastname": "Doe", "socid": "1"}]))
        .with("categories", json!([{"id": "5", "label": "Hardware"}]))
        .with(
            "products",
            json!([{"id": "20", "ref": "p-1", "label": "Setup", "price": "10.00", "tva_tx": "20.000", "fk_product_type": "1", "fk_categorie": "5"}]),
        )
        .with(
            "proposals",
            json!([
                {"id": "30", "ref": "PR1", "socid": "1", "statut": "2", "datep": "2024-01-10",
                 "total_ht": "10.00", "total_tva": "2.00", "total_ttc": "12.00",
                 "lines": [
                    {"qty": "1", "subprice": "10.00", "tva_tx": "20.000", "desc": "Setup", "fk_product": "20"},
                    {"qty": "0", "subprice": "5.00", "desc": "Broken"}
                 ]},
                {"id": "31", "socid": "99"}
            ]),
        )
        .with(
            "invoices",
            json!([
                {"id": "40", "ref": "F1", "socid": "1", "statut": "1", "date": "2024-02-01", "total_ttc": "12.00"},
                {"id": "41", "ref": "F2", "socid": "1", "statut": "2", "paye": "1", "date": "2024-02-01", "date_lim_reglement": "2024-03-01", "total_ttc": "5.00"}
            ]),
        )
        .with("invoices/40/payments", json!([{"amount": "12.00", "type": "VIR", "date": "2024-02-10", "num": "TX-1"}]))
        .with("invoices/41/payments", json!([{"amount": "5.00", "type": "CHQ", "date": "2024-02-05", "num": "CHK-9"}]))
        .with("orders", json!([{"id": "50", "ref": "C1", "socid": "1", "statut": "3", "date": "2024-01-12"}]))
        .with("supplier_orders", json!([{"id": "60", "ref": "SO1"}]))
}

fn orchestrator(source: FakeSource, sink: Arc<FakeSink>, runs: Arc<FakeRuns>) -> ImportOrchestrator {
    let source = Arc::new(source);
    ImportOrchestrator::new(sink, runs).with_connector(Arc::new(move |_cfg: &ImportConfig| {
        Ok(source.clone() as Arc<dyn DolibarrSource>)
    }))
}

#[tokio::test]
async fn full_import_replays_every_step() {
    let tenant = TenantId::new();
    let sink = Arc::new(FakeSink::default());
    let runs = Arc::new(FakeRuns::default());
    let orch = orchestrator(dolibarr(), sink.clone(), runs.clone());

    let run = orch.run_import(tenant, &config(), None).await.unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.finished_at.is_some());

    let step = |code: &str| run.steps.get(code).copied().unwrap_or_default();
    assert_eq!(step("DICTIONARIES").imported, 1);
    assert_eq!(step("THIRD_PARTIES").imported, 1);
    assert_eq!(step("THIRD_PARTIES").skipped, 1);
    assert_eq!(step("PROPOSALS").skipped, 1);
    assert_eq!(step("PAYMENTS").imported, 2);
    assert_eq!(step("PAYMENTS").skipped, 0);
    assert_eq!(step("STAGING").imported, 1);

    let w = sink.written.lock().unwrap();
    let acme = &w.third_parties[0];
    assert_eq!(acme.code, "CU01");
    assert!(acme.customer && acme.prospect && !acme.supplier);
    assert_eq!(acme.details.email, None);

    assert_eq!(w.contacts[0].profile.first_name.as_deref(), Some("?"));
    assert_eq!(w.links[0].third_party_id, acme.third_party_id);
    assert_eq!(w.links[0].link_type, "SALARIE");

    let product = &w.products[0];
    assert_eq!(product.code, "P-1");
    assert_eq!(product.profile.kind, ProductKind::Service);
    assert_eq!(product.profile.vat_rate_bps, 2_000);
    assert_eq!(product.profile.category_id, Some(w.categories[0].category_id));

    let proposal = &w.proposals[0];
    assert_eq!(proposal.status, ProposalStatus::Accepted);
    assert_eq!(proposal.lines.len(), 1);
    assert_eq!(proposal.lines[0].product_id, Some(product.product_id));
    assert_eq!(proposal.totals.total, 1_200);

    let open = w.invoices.iter().find(|i| i.reference == "F1").unwrap();
    assert_eq!(open.status, InvoiceStatus::Validated);
    assert_eq!(open.due_date.unwrap().to_string(), "2024-03-02");
    let paid = w.invoices.iter().find(|i| i.reference == "F2").unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.amount_paid, 500);

    assert_eq!(w.payments.len(), 1);
    assert_eq!(w.payments[0].invoice_id, open.invoice_id);
    assert_eq!(w.payments[0].method, PaymentMethod::Bank);
    assert_eq!(w.payments[0].reference.as_deref(), Some("TX-1"));

    // settled invoices keep their Dolibarr payment rows without being paid twice
    assert_eq!(w.history.len(), 1);
    assert_eq!(w.history[0].invoice_id, paid.invoice_id);
    assert_eq!(w.history[0].amount, 500);
    assert_eq!(w.history[0].reference.as_deref(), Some("CHK-9"));

    assert_eq!(w.orders[0].status, OrderStatus::Delivered);
    assert_eq!(w.dictionary[0].0, DictionaryType::Country);

    let staged = runs.staging(tenant, run.id);
    assert_eq!(staged[0].resource, "supplier_orders");
    assert_eq!(staged[0].external_id, 60);

    let logs = runs.logs(tenant, run.id);
    assert_eq!(logs.first().unwrap().step, "START");
    assert_eq!(logs.last().unwrap().step, "END");
    assert!(logs.iter().any(|l| l.level == LogLevel::Warn && l.message.contains("line dropped")));
}

#[tokio::test]
async fn a_second_run_reuses_existing_rows() {
    let tenant = TenantId::new();
    let sink = Arc::new(FakeSink::default());
    let runs = Arc::new(FakeRuns::default());
    let orch = orchestrator(dolibarr(), sink.clone(), runs.clone());

    let first = orch.run_import(tenant, &config(), None).await.unwrap();
    let second = orch.run_import(tenant, &config(), None).await.unwrap();

    let counters = second.steps["THIRD_PARTIES"];
    assert_eq!(counters.imported, 0);
    assert_eq!(counters.skipped, 2);
    assert_eq!(second.steps["ORDERS"].imported, 0);
    assert_eq!(second.steps["PAYMENTS"].imported, 0);
    assert_eq!(second.steps["PAYMENTS"].skipped, 2);
    {
        let w = sink.written.lock().unwrap();
        assert_eq!(w.third_parties.len(), 1);
        assert_eq!(w.payments.len(), 1);
        assert_eq!(w.history.len(), 1);
    }

    let first_local = runs.find_local_id(tenant, first.id, "thirdparties", 1).unwrap();
    let second_local: AggregateId = runs.find_local_id(tenant, second.id, "thirdparties", 1).unwrap();
    assert_eq!(first_local, second_local);
    assert_eq!(runs.list_runs(tenant)[0].id, second.id);
}

#[tokio::test]
async fn a_failing_resource_makes_the_run_partial() {
    let tenant = TenantId::new();
    let runs = Arc::new(FakeRuns::default());
    let orch = orchestrator(dolibarr().failing("thirdparties"), Arc::new(FakeSink::default()), runs.clone());

    let run = orch.run_import(tenant, &config(), None).await.unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.steps["THIRD_PARTIES"].errors, 1);
    // documents referencing unknown third parties are skipped, not failed
    assert_eq!(run.steps["PROPOSALS"].errors, 0);
    assert!(
        runs.logs(tenant, run.id)
            .iter()
            .any(|l| l.level == LogLevel::Error && l.step == "THIRD_PARTIES")
    );
}

#[tokio::test]
async fn configuration_is_checked_before_starting() {
    let runs = Arc::new(FakeRuns::default());
    let orch = orchestrator(dolibarr(), Arc::new(FakeSink::default()), runs.clone());

    let mut cfg = config();
    cfg.base_url = "  ".to_string();
    let err = orch.run_import(TenantId::new(), &cfg, None).await.unwrap_err();
    assert!(matches!(err, ImportError::Config(_)));

    let err = orch.run_import(TenantId::nil(), &config(), None).await.unwrap_err();
    assert!(matches!(err, ImportError::Config(_)));
    assert!(runs.books.lock().unwrap().runs.is_empty());
}

#[tokio::test]
async fn partially_paid_invoices_bring_every_payment_row() {
    let tenant = TenantId::new();
    let sink = Arc::new(FakeSink::default());
    let source = FakeSource::default()
        .with("thirdparties", json!([{"id": "1", "name": "Acme", "code_client": "CU01", "client": "1"}]))
        .with(
            "invoices",
            json!([{"id": "70", "ref": "F7", "socid": "1", "statut": "1", "paye": "0",
                    "date": "2024-04-01", "total_ttc": "100.00", "sumpayed": "60.00"}]),
        )
        .with(
            "invoices/70/payments",
            json!([
                {"amount": "40.00", "type": "VIR", "date": "2024-04-03", "ref": "PAY-1"},
                {"amount": "20.00", "type": "LIQ", "date": "2024-04-09", "ref": "PAY-2"},
                {"amount": "0", "date": "2024-04-10"}
            ]),
        );
    let orch = orchestrator(source, sink.clone(), Arc::new(FakeRuns::default()));

    let run = orch.run_import(tenant, &config(), None).await.unwrap();
    assert_eq!(run.steps["PAYMENTS"].imported, 2);
    assert_eq!(run.steps["PAYMENTS"].skipped, 1);

    let w = sink.written.lock().unwrap();
    assert_eq!(w.invoices[0].status, InvoiceStatus::PartiallyPaid);
    assert_eq!(w.invoices[0].amount_paid, 6_000);
    assert!(w.payments.is_empty());
    let amounts: Vec<_> = w.history.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, [4_000, 2_000]);
}

#[tokio::test]
async fn a_run_stops_when_its_records_cannot_be_written() {
    let tenant = TenantId::new();
    let runs = Arc::new(FakeRuns {
        unwritable_mappings: true,
        ..FakeRuns::default()
    });
    let sink = Arc::new(FakeSink::default());
    let orch = orchestrator(dolibarr(), sink.clone(), runs.clone());

    let err = orch.run_import(tenant, &config(), None).await.unwrap_err();
    assert!(matches!(err, ImportError::Store(_)));
    // nothing after the failing step ran
    assert!(sink.written.lock().unwrap().invoices.is_empty());
}
