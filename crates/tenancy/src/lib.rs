//! `atelier-tenancy`: the tenant boundary.
//!
//! Tenant records and subscription plans, per-tenant module enablement, the
//! dictionaries every tenant starts with, per-request tenant resolution and the
//! task-local "current tenant" that record lifecycles consult.

pub mod context;
pub mod dictionary;
pub mod modules;
pub mod resolve;
pub mod tenant;

pub use context::{CurrentTenant, Stamped, TenantContextError};
pub use dictionary::{DictionaryItem, DictionaryType, NewDictionaryItem, sort_items};
pub use modules::{CoreModule, ModuleSetting, nocode_module_key};
pub use resolve::{
    ResolutionOptions, ResolutionSource, ResolveError, ResolvedTenant, TenantLookup,
    TenantRequest, path_tenant_code, resolve_tenant, subdomain_code,
};
pub use tenant::{RegisterTenant, SubscriptionPlan, Tenant, slugify, unique_code};
