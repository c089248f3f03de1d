//! `atelier-nocode`: tenant-defined modules, entities and their records.
//!
//! A tenant publishes a [`ModuleDefinition`], declares entities with a field
//! schema inside it, and stores [`CustomRecord`]s whose JSON payload is checked
//! against that schema.

pub mod definition;
pub mod record;

pub use definition::{
    CustomEntityDefinition, DEFAULT_MODULE_VERSION, EntityDraft, FieldDef, FieldType,
    ModuleDefinition, ModuleDraft,
};
pub use record::{CustomRecord, NocodeError, validate_payload};
