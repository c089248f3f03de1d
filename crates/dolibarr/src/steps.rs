//! One method per import step. Row-level problems are logged and counted;
//! only a failure to read a whole resource fails the step.

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use atelier_catalog::{CategoryId, CreateCategory, CreateProduct, ProductId, ProductKind, ProductProfile};
use atelier_core::{AggregateId, DomainError, TenantId};
use atelier_invoicing::{
    ImportInvoice, ImportPayment, InvoiceId, InvoiceKind, InvoiceStatus, PaymentId, PaymentMethod, RegisterPayment,
};
use atelier_parties::{
    ContactId, ContactProfile, CreateContact, DEFAULT_PAYMENT_TERMS_DAYS, LinkThirdParty,
    RegisterThirdParty, ThirdPartyDetails, ThirdPartyId,
};
use atelier_sales::{
    DocumentLine, DocumentTotals, ImportProposal, ImportSalesOrder, LineInput, OrderStatus,
    ProposalId, ProposalStatus, SalesOrderId,
};
use atelier_tenancy::{DictionaryType, NewDictionaryItem};

use crate::client::{ClientError, DolibarrSource};
use crate::run::{ImportLog, ImportMapping, ImportRun, LogLevel, RunStore, StagingRecord};
use crate::sink::{ImportError, ImportSink};
use crate::value::{
    dolibarr_id, get_bool, get_date, get_decimal, get_i64, get_string, third_party_code,
};

const DEFAULT_CURRENCY: &str = "EUR";
const CONTACT_LINK_TYPE: &str = "SALARIE";

const DICTIONARY_RESOURCES: [(&str, DictionaryType, &str, &str); 5] = [
    ("setup/dictionary/countries", DictionaryType::Country, "code", "label"),
    ("setup/dictionary/currencies", DictionaryType::Currency, "code_iso", "label"),
    ("setup/dictionary/civilities", DictionaryType::Civility, "code", "label"),
    ("setup/dictionary/legal_form", DictionaryType::LegalForm, "code", "libelle"),
    ("setup/dictionary/payment_types", DictionaryType::PaymentMethod, "code", "label"),
];

pub const STAGING_RESOURCES: [&str; 9] = [
    "supplier_orders",
    "supplier_proposals",
    "contracts",
    "projects",
    "tasks",
    "stockmovements",
    "expensereports",
    "agendaevents",
    "users",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Dictionaries,
    ThirdParties,
    Contacts,
    Products,
    Proposals,
    Invoices,
    Payments,
    Orders,
    Staging,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::Dictionaries,
        Step::ThirdParties,
        Step::Contacts,
        Step::Products,
        Step::Proposals,
        Step::Invoices,
        Step::Payments,
        Step::Orders,
        Step::Staging,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Step::Dictionaries => "DICTIONARIES",
            Step::ThirdParties => "THIRD_PARTIES",
            Step::Contacts => "CONTACTS",
            Step::Products => "PRODUCTS",
            Step::Proposals => "PROPOSALS",
            Step::Invoices => "INVOICES",
            Step::Payments => "PAYMENTS",
            Step::Orders => "ORDERS",
            Step::Staging => "STAGING",
        }
    }
}

fn list_params(limit: &'static str) -> [(&'static str, &'static str); 2] {
    [("limit", limit), ("sortfield", "t.rowid")]
}

/// What the payment step does with an invoice's Dolibarr payment rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaymentReplay {
    /// Open invoice imported with nothing paid: payments move its balance.
    Register,
    /// The paid amount already covers the rows, or the invoice came from an
    /// earlier run: rows are kept as payment history only.
    History,
    /// Draft or cancelled with nothing paid.
    Skip,
}

impl PaymentReplay {
    fn for_import(status: InvoiceStatus, amount_paid: i64) -> Self {
        match status {
            _ if amount_paid > 0 => PaymentReplay::History,
            InvoiceStatus::Validated | InvoiceStatus::Sent => PaymentReplay::Register,
            InvoiceStatus::Paid | InvoiceStatus::PartiallyPaid => PaymentReplay::History,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled => PaymentReplay::Skip,
        }
    }
}

/// Invoice mapped by this run, remembered for the payment step.
#[derive(Debug, Clone, Copy)]
struct ImportedInvoice {
    dolibarr_id: i64,
    invoice_id: InvoiceId,
    replay: PaymentReplay,
}

pub(crate) struct Importer<'a> {
    pub(crate) run: ImportRun,
    source: &'a dyn DolibarrSource,
    sink: &'a dyn ImportSink,
    store: &'a dyn RunStore,
    invoices: Vec<ImportedInvoice>,
}

impl<'a> Importer<'a> {
    pub(crate) fn new(
        run: ImportRun,
        source: &'a dyn DolibarrSource,
        sink: &'a dyn ImportSink,
        store: &'a dyn RunStore,
    ) -> Self {
        Self {
            run,
            source,
            sink,
            store,
            invoices: Vec::new(),
        }
    }

    fn tenant(&self) -> TenantId {
        self.run.tenant_id
    }

    fn log(&self, log: ImportLog) -> Result<(), ImportError> {
        self.store.append_log(self.tenant(), log)
    }

    pub(crate) fn info(&self, step: &str, message: &str) -> Result<(), ImportError> {
        self.log(ImportLog::new(self.run.id, step, LogLevel::Info, message))
    }

    fn warn(&self, step: Step, external_id: Option<i64>, message: &str) -> Result<(), ImportError> {
        let mut log = ImportLog::new(self.run.id, step.code(), LogLevel::Warn, message);
        log.external_id = external_id.map(|id| id.to_string());
        self.log(log)
    }

    fn skip(&mut self, step: Step, external_id: i64, message: &str) -> Result<(), ImportError> {
        self.run.counters_mut(step.code()).skipped += 1;
        self.log(ImportLog::new(self.run.id, step.code(), LogLevel::Skip, message).external(external_id))
    }

    pub(crate) fn error(&mut self, step: Step, external_id: Option<i64>, message: &str) -> Result<(), ImportError> {
        self.run.counters_mut(step.code()).errors += 1;
        let mut log = ImportLog::new(self.run.id, step.code(), LogLevel::Error, message);
        log.external_id = external_id.map(|id| id.to_string());
        self.log(log)
    }

    fn imported(&mut self, step: Step) {
        self.run.counters_mut(step.code()).imported += 1;
    }

    fn map(
        &self,
        dolibarr_entity: &str,
        dolibarr_id: i64,
        local_entity: &str,
        local_id: AggregateId,
    ) -> Result<(), ImportError> {
        self.store.save_mapping(
            self.tenant(),
            ImportMapping {
                run_id: self.run.id,
                dolibarr_entity: dolibarr_entity.to_string(),
                dolibarr_id,
                local_entity: local_entity.to_string(),
                local_id,
            },
        )
    }

    fn local_id(&self, dolibarr_entity: &str, dolibarr_id: i64) -> Option<AggregateId> {
        self.store.find_local_id(self.tenant(), self.run.id, dolibarr_entity, dolibarr_id)
    }

    async fn fetch(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>, ClientError> {
        let items = self.source.get_list(resource, params).await?;
        debug!(resource, count = items.len(), "fetched Dolibarr resource");
        Ok(items)
    }

    pub(crate) async fn run_step(&mut self, step: Step) -> Result<(), ImportError> {
        match step {
            Step::Dictionaries => self.dictionaries().await,
            Step::ThirdParties => self.third_parties().await,
            Step::Contacts => self.contacts().await,
            Step::Products => self.products().await,
            Step::Proposals => self.proposals().await,
            Step::Invoices => self.invoices().await,
            Step::Payments => self.payments().await,
            Step::Orders => self.orders().await,
            Step::Staging => self.staging().await,
        }
    }

    async fn dictionaries(&mut self) -> Result<(), ImportError> {
        let step = Step::Dictionaries;
        for (resource, dictionary_type, code_key, label_key) in DICTIONARY_RESOURCES {
            let items = match self.fetch(resource, &[("limit", "5000")]).await {
                Ok(items) => items,
                Err(err) => {
                    self.warn(step, None, &format!("could not load {resource}: {err}"))?;
                    continue;
                }
            };
            let mut count = 0;
            for item in &items {
                let Some(code) = get_string(item, code_key) else {
                    continue;
                };
                let label = get_string(item, label_key).unwrap_or_else(|| code.clone());
                let input = NewDictionaryItem {
                    code,
                    label,
                    sort_order: Some(count),
                    active: Some(true),
                };
                match self.sink.upsert_dictionary_item(self.tenant(), dictionary_type, input) {
                    Ok(()) => {
                        count += 1;
                        self.imported(step);
                    }
                    Err(err) => self.error(step, dolibarr_id(item), &err.to_string())?,
                }
            }
            self.info(
                step.code(),
                &format!("imported {count} {} items from {resource}", dictionary_type.code()),
            )?;
        }
        Ok(())
    }

    async fn third_parties(&mut self) -> Result<(), ImportError> {
        let step = Step::ThirdParties;
        let items = self.fetch("thirdparties", &list_params("10000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let Some(name) = get_string(item, "name").or_else(|| get_string(item, "nom")) else {
                self.skip(step, doli_id, "missing name")?;
                continue;
            };
            let code = third_party_code(item).to_uppercase();
            if let Some(existing) = self.sink.third_party_by_code(self.tenant(), &code) {
                self.map("thirdparties", doli_id, "THIRD_PARTY", existing.0)?;
                self.skip(step, doli_id, &format!("code already exists: {code}"))?;
                continue;
            }

            let client_flag = get_i64(item, "client").unwrap_or(0);
            let cmd = RegisterThirdParty {
                tenant_id: self.tenant(),
                third_party_id: ThirdPartyId(AggregateId::new()),
                code,
                name,
                customer: matches!(client_flag, 1 | 3),
                supplier: get_bool(item, "fournisseur"),
                prospect: matches!(client_flag, 2 | 3),
                details: ThirdPartyDetails {
                    legal_form: get_string(item, "forme_juridique_code"),
                    address: get_string(item, "address"),
                    zip: get_string(item, "zip"),
                    city: get_string(item, "town"),
                    country_code: get_string(item, "country_code"),
                    phone: get_string(item, "phone"),
                    email: get_string(item, "email").filter(|e| e.contains('@')),
                    website: get_string(item, "url"),
                    vat_number: get_string(item, "tva_intra"),
                    registration_id: get_string(item, "idprof1"),
                    currency: get_string(item, "multicurrency_code"),
                    notes: get_string(item, "note_private"),
                },
                payment_terms_days: get_i64(item, "cond_reglement_days").and_then(|d| u32::try_from(d).ok()),
                credit_limit: get_decimal(item, "outstanding_limit", 2),
                occurred_at: Utc::now(),
            };
            match self.sink.create_third_party(cmd) {
                Ok(id) => {
                    self.map("thirdparties", doli_id, "THIRD_PARTY", id.0)?;
                    self.imported(step);
                }
                Err(err) => self.error(step, Some(doli_id), &err.to_string())?,
            }
        }
        Ok(())
    }

    async fn contacts(&mut self) -> Result<(), ImportError> {
        let step = Step::Contacts;
        let items = self.fetch("contacts", &list_params("10000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let Some(last_name) = get_string(item, "lastname").or_else(|| get_string(item, "nom")) else {
                self.skip(step, doli_id, "missing last name")?;
                continue;
            };
            let first_name = get_string(item, "firstname")
                .or_else(|| get_string(item, "prenom"))
                .unwrap_or_else(|| "?".to_string());

            let contact_id = ContactId(AggregateId::new());
            let cmd = CreateContact {
                tenant_id: self.tenant(),
                contact_id,
                profile: ContactProfile {
                    first_name: Some(first_name),
                    last_name,
                    job_title: get_string(item, "poste"),
                    email: get_string(item, "email").filter(|e| e.contains('@')),
                    phone: get_string(item, "phone_pro"),
                    mobile: get_string(item, "phone_mobile"),
                    address: get_string(item, "address"),
                    zip: get_string(item, "zip"),
                    city: get_string(item, "town"),
                    ..ContactProfile::default()
                },
                primary: false,
                occurred_at: Utc::now(),
            };
            let contact_id = match self.sink.create_contact(cmd) {
                Ok(id) => id,
                Err(err) => {
                    self.error(step, Some(doli_id), &err.to_string())?;
                    continue;
                }
            };
            self.map("contacts", doli_id, "CONTACT", contact_id.0)?;
            self.imported(step);

            let linked = get_i64(item, "socid").and_then(|soc| self.local_id("thirdparties", soc));
            if let Some(third_party) = linked {
                let link = LinkThirdParty {
                    tenant_id: self.tenant(),
                    contact_id,
                    third_party_id: ThirdPartyId(third_party),
                    link_type: CONTACT_LINK_TYPE.to_string(),
                    occurred_at: Utc::now(),
                };
                if let Err(err) = self.sink.link_contact(link) {
                    self.warn(step, Some(doli_id), &format!("could not link contact: {err}"))?;
                }
            }
        }
        Ok(())
    }

    async fn categories(&mut self) -> Result<(), ImportError> {
        let step = Step::Products;
        let items = self.fetch("categories", &[("type", "product"), ("limit", "1000")]).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let label = get_string(item, "label");
            let code = format!("CAT-{doli_id}");
            if let Some(existing) = self.sink.category_by_code(self.tenant(), &code) {
                self.map("categories", doli_id, "CATEGORY", existing.0)?;
                continue;
            }
            let cmd = CreateCategory {
                tenant_id: self.tenant(),
                category_id: CategoryId(AggregateId::new()),
                label: label.unwrap_or_else(|| code.clone()),
                code,
                parent_id: None,
                occurred_at: Utc::now(),
            };
            match self.sink.create_category(cmd) {
                Ok(id) => self.map("categories", doli_id, "CATEGORY", id.0)?,
                Err(err) => self.warn(step, Some(doli_id), &format!("category not imported: {err}"))?,
            }
        }
        Ok(())
    }

    async fn products(&mut self) -> Result<(), ImportError> {
        let step = Step::Products;
        if let Err(err) = self.categories().await {
            self.warn(step, None, &format!("could not load categories: {err}"))?;
        }

        let items = self.fetch("products", &list_params("10000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let code = get_string(item, "ref")
                .unwrap_or_else(|| format!("PRD-{doli_id}"))
                .to_uppercase();
            if let Some(existing) = self.sink.product_by_code(self.tenant(), &code) {
                self.map("products", doli_id, "PRODUCT", existing.0)?;
                self.skip(step, doli_id, &format!("code already exists: {code}"))?;
                continue;
            }

            let name = get_string(item, "label")
                .or_else(|| get_string(item, "name"))
                .unwrap_or_else(|| code.clone());
            let service = get_string(item, "fk_product_type")
                .or_else(|| get_string(item, "type"))
                .is_some_and(|t| t == "1");
            let category_id = get_i64(item, "fk_categorie")
                .and_then(|c| self.local_id("categories", c))
                .map(CategoryId);

            let cmd = CreateProduct {
                tenant_id: self.tenant(),
                product_id: ProductId(AggregateId::new()),
                code,
                profile: ProductProfile {
                    name,
                    description: get_string(item, "description"),
                    kind: if service { ProductKind::Service } else { ProductKind::Product },
                    unit: None,
                    sale_price: get_decimal(item, "price", 2).unwrap_or(0).max(0),
                    purchase_price: get_decimal(item, "cost_price", 2)
                        .or_else(|| get_decimal(item, "pmp", 2))
                        .filter(|p| *p > 0),
                    vat_rate_bps: rate_bps(item, "tva_tx"),
                    sellable: get_bool(item, "tosell"),
                    purchasable: get_bool(item, "tobuy"),
                    track_stock: false,
                    barcode: get_string(item, "barcode"),
                    category_id,
                },
                occurred_at: Utc::now(),
            };
            match self.sink.create_product(cmd) {
                Ok(id) => {
                    self.map("products", doli_id, "PRODUCT", id.0)?;
                    self.imported(step);
                }
                Err(err) => self.error(step, Some(doli_id), &err.to_string())?,
            }
        }
        Ok(())
    }

    /// Third party of a commercial document, or a SKIP when it was not imported.
    fn document_third_party(
        &mut self,
        step: Step,
        item: &Value,
        doli_id: i64,
    ) -> Result<Option<ThirdPartyId>, ImportError> {
        let Some(soc) = get_i64(item, "socid") else {
            self.skip(step, doli_id, "missing socid")?;
            return Ok(None);
        };
        match self.local_id("thirdparties", soc) {
            Some(id) => Ok(Some(ThirdPartyId(id))),
            None => {
                self.skip(step, doli_id, &format!("third party {soc} not imported"))?;
                Ok(None)
            }
        }
    }

    fn document_lines(&self, step: Step, item: &Value, doli_id: i64) -> Result<Vec<DocumentLine>, ImportError> {
        let Some(raw) = item.get("lines").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        let mut lines = Vec::with_capacity(raw.len());
        for line in raw {
            let line_no = lines.len() as u32 + 1;
            let input = LineInput {
                product_id: get_i64(line, "fk_product")
                    .and_then(|p| self.local_id("products", p))
                    .map(ProductId),
                description: get_string(line, "desc")
                    .or_else(|| get_string(line, "label"))
                    .or_else(|| get_string(line, "product_label"))
                    .unwrap_or_else(|| format!("Line {line_no}")),
                quantity_milli: get_decimal(line, "qty", 3).unwrap_or(0),
                unit_price: get_decimal(line, "subprice", 2).unwrap_or(0),
                discount_bps: rate_bps(line, "remise_percent"),
                vat_rate_bps: rate_bps(line, "tva_tx"),
            };
            match DocumentLine::price(line_no, &input) {
                Ok(priced) => lines.push(priced),
                Err(err) => self.warn(step, Some(doli_id), &format!("line dropped: {err}"))?,
            }
        }
        Ok(lines)
    }

    async fn proposals(&mut self) -> Result<(), ImportError> {
        let step = Step::Proposals;
        let items = self.fetch("proposals", &list_params("5000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let Some(third_party_id) = self.document_third_party(step, item, doli_id)? else {
                continue;
            };
            let reference = get_string(item, "ref").unwrap_or_else(|| format!("PRO-{doli_id}"));
            if let Some(existing) = self.sink.proposal_by_reference(self.tenant(), &reference) {
                self.map("proposals", doli_id, "PROPOSAL", existing.0)?;
                self.skip(step, doli_id, &format!("reference already exists: {reference}"))?;
                continue;
            }

            let issue_date = get_date(item, "datep")
                .or_else(|| get_date(item, "date"))
                .unwrap_or_else(|| Utc::now().date_naive());
            let cmd = ImportProposal {
                tenant_id: self.tenant(),
                proposal_id: ProposalId(AggregateId::new()),
                reference,
                third_party_id,
                issue_date,
                valid_until: get_date(item, "fin_validite").filter(|d| *d >= issue_date),
                currency: currency(item),
                status: proposal_status(get_i64(item, "statut")),
                lines: self.document_lines(step, item, doli_id)?,
                totals: imported_totals(item),
                occurred_at: Utc::now(),
            };
            match self.sink.import_proposal(cmd) {
                Ok(id) => {
                    self.map("proposals", doli_id, "PROPOSAL", id.0)?;
                    self.imported(step);
                }
                Err(err) => self.error(step, Some(doli_id), &err.to_string())?,
            }
        }
        Ok(())
    }

    async fn invoices(&mut self) -> Result<(), ImportError> {
        let step = Step::Invoices;
        let items = self.fetch("invoices", &list_params("5000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let Some(third_party_id) = self.document_third_party(step, item, doli_id)? else {
                continue;
            };
            let reference = get_string(item, "ref").unwrap_or_else(|| format!("INV-{doli_id}"));
            if let Some(existing) = self.sink.invoice_by_reference(self.tenant(), &reference) {
                self.map("invoices", doli_id, "INVOICE", existing.0)?;
                self.invoices.push(ImportedInvoice {
                    dolibarr_id: doli_id,
                    invoice_id: existing,
                    replay: PaymentReplay::History,
                });
                self.skip(step, doli_id, &format!("reference already exists: {reference}"))?;
                continue;
            }

            let issue_date = get_date(item, "date").unwrap_or_else(|| Utc::now().date_naive());
            let due_date = get_date(item, "date_lim_reglement")
                .filter(|d| *d >= issue_date)
                .unwrap_or_else(|| default_due(issue_date));
            let totals = imported_totals(item);
            let paid = get_decimal(item, "sumpayed", 2)
                .or_else(|| get_decimal(item, "totalpaid", 2))
                .unwrap_or(0)
                .max(0);
            let status = invoice_status(item, totals.total, paid);
            let amount_paid = if status == InvoiceStatus::Paid { paid.max(totals.total) } else { paid };

            let invoice_id = InvoiceId(AggregateId::new());
            let cmd = ImportInvoice {
                tenant_id: self.tenant(),
                invoice_id,
                kind: if get_i64(item, "type") == Some(2) {
                    InvoiceKind::Purchase
                } else {
                    InvoiceKind::Sales
                },
                reference,
                third_party_id,
                issue_date,
                due_date: Some(due_date),
                currency: currency(item),
                status,
                lines: self.document_lines(step, item, doli_id)?,
                totals,
                amount_paid,
                occurred_at: Utc::now(),
            };
            match self.sink.import_invoice(cmd) {
                Ok(id) => {
                    self.map("invoices", doli_id, "INVOICE", id.0)?;
                    self.invoices.push(ImportedInvoice {
                        dolibarr_id: doli_id,
                        invoice_id: id,
                        replay: PaymentReplay::for_import(status, amount_paid),
                    });
                    self.imported(step);
                }
                Err(err) => self.error(step, Some(doli_id), &err.to_string())?,
            }
        }
        Ok(())
    }

    /// A payment row already on the invoice counts as a SKIP, so later runs
    /// do not record it twice.
    async fn payments(&mut self) -> Result<(), ImportError> {
        let step = Step::Payments;
        let invoices = self.invoices.clone();
        for inv in invoices {
            if inv.replay == PaymentReplay::Skip {
                self.skip(step, inv.dolibarr_id, "draft or cancelled invoice without payments")?;
                continue;
            }

            let resource = format!("invoices/{}/payments", inv.dolibarr_id);
            let payments = match self.fetch(&resource, &[]).await {
                Ok(p) => p,
                Err(err) => {
                    self.error(step, Some(inv.dolibarr_id), &format!("could not load payments: {err}"))?;
                    continue;
                }
            };

            for payment in &payments {
                let Some(amount) = get_decimal(payment, "amount", 2).filter(|a| *a > 0) else {
                    self.skip(step, inv.dolibarr_id, "payment without a positive amount")?;
                    continue;
                };
                let paid_on = get_date(payment, "date")
                    .or_else(|| get_date(payment, "datep"))
                    .unwrap_or_else(|| Utc::now().date_naive());
                let method = get_string(payment, "type")
                    .and_then(|t| PaymentMethod::parse(&t))
                    .unwrap_or_default();
                let reference = get_string(payment, "num_payment")
                    .or_else(|| get_string(payment, "num"))
                    .or_else(|| get_string(payment, "ref"));

                let written = match inv.replay {
                    PaymentReplay::Register => self.sink.register_payment(RegisterPayment {
                        tenant_id: self.tenant(),
                        invoice_id: inv.invoice_id,
                        payment_id: PaymentId(AggregateId::new()),
                        amount,
                        paid_on,
                        method,
                        reference,
                        bank_account_id: None,
                        occurred_at: Utc::now(),
                    }),
                    PaymentReplay::History | PaymentReplay::Skip => self.sink.import_payment(ImportPayment {
                        tenant_id: self.tenant(),
                        invoice_id: inv.invoice_id,
                        payment_id: PaymentId(AggregateId::new()),
                        amount,
                        paid_on,
                        method,
                        reference,
                        occurred_at: Utc::now(),
                    }),
                };
                match written {
                    Ok(()) => self.imported(step),
                    Err(ImportError::Domain(DomainError::Conflict(msg))) => self.skip(step, inv.dolibarr_id, &msg)?,
                    Err(err) => self.error(step, Some(inv.dolibarr_id), &err.to_string())?,
                }
            }
        }
        Ok(())
    }

    async fn orders(&mut self) -> Result<(), ImportError> {
        let step = Step::Orders;
        let items = self.fetch("orders", &list_params("5000")).await?;
        for item in &items {
            let Some(doli_id) = dolibarr_id(item) else {
                continue;
            };
            let Some(third_party_id) = self.document_third_party(step, item, doli_id)? else {
                continue;
            };
            let reference = get_string(item, "ref").unwrap_or_else(|| format!("ORD-{doli_id}"));
            if let Some(existing) = self.sink.order_by_reference(self.tenant(), &reference) {
                self.map("orders", doli_id, "ORDER", existing.0)?;
                self.skip(step, doli_id, &format!("reference already exists: {reference}"))?;
                continue;
            }

            let order_date = get_date(item, "date_commande")
                .or_else(|| get_date(item, "date"))
                .unwrap_or_else(|| Utc::now().date_naive());
            let cmd = ImportSalesOrder {
                tenant_id: self.tenant(),
                order_id: SalesOrderId(AggregateId::new()),
                reference,
                third_party_id,
                order_date,
                expected_delivery: get_date(item, "delivery_date").filter(|d| *d >= order_date),
                currency: currency(item),
                status: order_status(get_i64(item, "statut")),
                lines: self.document_lines(step, item, doli_id)?,
                totals: imported_totals(item),
                occurred_at: Utc::now(),
            };
            match self.sink.import_order(cmd) {
                Ok(id) => {
                    self.map("orders", doli_id, "ORDER", id.0)?;
                    self.imported(step);
                }
                Err(err) => self.error(step, Some(doli_id), &err.to_string())?,
            }
        }
        Ok(())
    }

    async fn staging(&mut self) -> Result<(), ImportError> {
        let step = Step::Staging;
        for resource in STAGING_RESOURCES {
            let items = match self.fetch(resource, &list_params("5000")).await {
                Ok(items) => items,
                Err(err) => {
                    self.warn(step, None, &format!("could not load {resource}: {err}"))?;
                    continue;
                }
            };
            if items.is_empty() {
                self.info(step.code(), &format!("{resource}: nothing to stage"))?;
                continue;
            }
            for item in items {
                let Some(external_id) = dolibarr_id(&item) else {
                    continue;
                };
                self.store.save_staging(
                    self.tenant(),
                    StagingRecord {
                        id: Uuid::now_v7(),
                        run_id: self.run.id,
                        resource: resource.to_string(),
                        external_id,
                        payload: item,
                    },
                )?;
                self.imported(step);
                self.log(
                    ImportLog::new(
                        self.run.id,
                        step.code(),
                        LogLevel::Info,
                        &format!("staged {resource} id={external_id}"),
                    )
                    .external(external_id),
                )?;
            }
        }
        Ok(())
    }
}

/// Percentage field (`"20.000"`) as basis points.
fn rate_bps(item: &Value, key: &str) -> u32 {
    get_decimal(item, key, 2)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

fn currency(item: &Value) -> String {
    get_string(item, "multicurrency_code")
        .filter(|c| c.len() == 3)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

fn default_due(issue_date: NaiveDate) -> NaiveDate {
    let days = u64::from(DEFAULT_PAYMENT_TERMS_DAYS);
    issue_date.checked_add_days(Days::new(days)).unwrap_or(issue_date)
}

/// Totals are taken as the source computed them.
fn imported_totals(item: &Value) -> DocumentTotals {
    let subtotal = get_decimal(item, "total_ht", 2).unwrap_or(0);
    let vat_amount = get_decimal(item, "total_tva", 2).unwrap_or(0);
    DocumentTotals {
        subtotal,
        discount_amount: 0,
        vat_amount,
        total: get_decimal(item, "total_ttc", 2).unwrap_or(subtotal + vat_amount),
    }
}

fn proposal_status(statut: Option<i64>) -> ProposalStatus {
    match statut {
        Some(1) => ProposalStatus::Sent,
        Some(2) => ProposalStatus::Accepted,
        Some(3) => ProposalStatus::Refused,
        Some(4) => ProposalStatus::Converted,
        Some(-1) => ProposalStatus::Cancelled,
        _ => ProposalStatus::Draft,
    }
}

fn order_status(statut: Option<i64>) -> OrderStatus {
    match statut {
        Some(-1) => OrderStatus::Cancelled,
        Some(2) => OrderStatus::Processing,
        Some(3) => OrderStatus::Delivered,
        _ => OrderStatus::Confirmed,
    }
}

fn invoice_status(item: &Value, total: i64, paid: i64) -> InvoiceStatus {
    if get_i64(item, "paye") == Some(1) {
        return InvoiceStatus::Paid;
    }
    match get_i64(item, "statut") {
        Some(0) => InvoiceStatus::Draft,
        Some(3) => InvoiceStatus::Cancelled,
        _ if paid > 0 && total - paid > 0 => InvoiceStatus::PartiallyPaid,
        _ => InvoiceStatus::Validated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoice_status_mapping() {
        assert_eq!(invoice_status(&json!({"paye": "1", "statut": "2"}), 100, 0), InvoiceStatus::Paid);
        assert_eq!(invoice_status(&json!({"statut": "0"}), 100, 0), InvoiceStatus::Draft);
        assert_eq!(invoice_status(&json!({"statut": "3"}), 100, 0), InvoiceStatus::Cancelled);
        assert_eq!(invoice_status(&json!({"statut": "1"}), 100, 40), InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice_status(&json!({"statut": "1"}), 100, 0), InvoiceStatus::Validated);
    }

    #[test]
    fn payments_replay_only_on_open_unpaid_invoices() {
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Validated, 0), PaymentReplay::Register);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Sent, 0), PaymentReplay::Register);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::PartiallyPaid, 400), PaymentReplay::History);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Paid, 1_000), PaymentReplay::History);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Cancelled, 200), PaymentReplay::History);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Draft, 0), PaymentReplay::Skip);
        assert_eq!(PaymentReplay::for_import(InvoiceStatus::Cancelled, 0), PaymentReplay::Skip);
    }

    #[test]
    fn proposal_and_order_status_mapping() {
        assert_eq!(proposal_status(Some(2)), ProposalStatus::Accepted);
        assert_eq!(proposal_status(Some(-1)), ProposalStatus::Cancelled);
        assert_eq!(proposal_status(None), ProposalStatus::Draft);
        assert_eq!(order_status(Some(0)), OrderStatus::Confirmed);
        assert_eq!(order_status(Some(1)), OrderStatus::Confirmed);
        assert_eq!(order_status(Some(3)), OrderStatus::Delivered);
    }

    #[test]
    fn totals_fall_back_to_sum() {
        let t = imported_totals(&json!({"total_ht": "100.00", "total_tva": "20.00"}));
        assert_eq!(t.total, 12_000);
        let t = imported_totals(&json!({"total_ht": "100", "total_tva": "20", "total_ttc": "119.99"}));
        assert_eq!(t.total, 11_999);
    }

    #[test]
    fn currency_defaults_to_euro() {
        assert_eq!(currency(&json!({})), "EUR");
        assert_eq!(currency(&json!({"multicurrency_code": "usd"})), "USD");
    }
}
