//! Infrastructure layer: event store, dispatcher, read models, record
//! services, blob storage, configuration and background workers.

pub mod automation;
pub mod backend;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod import_sink;
pub mod projections;
pub mod read_model;
pub mod records;
pub mod storage;
pub mod workers;

pub use backend::{Backend, BackendError, ReferenceKind};
pub use config::{AppConfig, ConfigError, StorageMode};
pub use import_sink::DispatchingImportSink;
