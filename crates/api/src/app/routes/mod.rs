use axum::{middleware::from_fn_with_state, routing::get, Router};

use atelier_infra::Backend;
use atelier_tenancy::CoreModule;

use crate::middleware::{ModuleGate, module_gate};

pub mod accounting;
pub mod agenda;
pub mod automation;
pub mod bank;
pub mod catalog;
pub mod common;
pub mod ged;
pub mod hr;
pub mod import;
pub mod invoices;
pub mod leave;
pub mod nocode;
pub mod parties;
pub mod sales;
pub mod system;
pub mod tenants;
pub mod tickets;

/// A module router that answers 403 while the tenant has the module switched off.
fn gated(backend: &Backend, module: CoreModule, router: Router) -> Router {
    let gate = ModuleGate {
        backend: backend.clone(),
        module,
    };
    router.route_layer(from_fn_with_state(gate, module_gate))
}

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router(backend: &Backend) -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/tenant", tenants::tenant_router())
        .nest("/dictionaries", tenants::dictionary_router())
        .nest("/third-parties", gated(backend, CoreModule::ThirdParty, parties::third_party_router()))
        .nest("/contacts", gated(backend, CoreModule::Contact, parties::contact_router()))
        .nest("/products", gated(backend, CoreModule::Product, catalog::product_router()))
        .nest("/categories", gated(backend, CoreModule::Product, catalog::category_router()))
        .nest("/proposals", gated(backend, CoreModule::Proposal, sales::proposal_router()))
        .nest("/orders", gated(backend, CoreModule::Order, sales::order_router()))
        .nest("/invoices", gated(backend, CoreModule::Invoice, invoices::invoice_router()))
        .nest("/accounting", gated(backend, CoreModule::Accounting, accounting::accounting_router()))
        .nest("/bank", gated(backend, CoreModule::Bank, bank::bank_router()))
        .nest("/hr", gated(backend, CoreModule::Hr, hr::hr_router()))
        .nest("/leave-requests", gated(backend, CoreModule::Leave, leave::leave_router()))
        .nest("/ged", gated(backend, CoreModule::Ged, ged::ged_router()))
        .nest("/tickets", gated(backend, CoreModule::Ticketing, tickets::ticket_router()))
        .nest("/agenda", gated(backend, CoreModule::Agenda, agenda::agenda_router()))
        .nest("/automation", automation::automation_router())
        .nest("/nocode", nocode::nocode_router())
        .nest("/import/dolibarr", import::import_router())
}
