//! Dolibarr importer: pulls a tenant's data from a Dolibarr instance over its
//! REST API and replays it as domain commands, keeping a per-run log, the
//! Dolibarr→local id mapping, and raw payloads for resources with no local home.

pub mod client;
pub mod orchestrator;
pub mod run;
pub mod sink;
pub mod steps;
pub mod value;

pub use client::{ClientError, DolibarrClient, DolibarrSource};
pub use orchestrator::{Connector, ImportOrchestrator};
pub use run::{
    ImportConfig, ImportLog, ImportMapping, ImportRun, LogLevel, RunStatus, RunStore,
    StagingRecord, StepCounters,
};
pub use sink::{ImportError, ImportSink};
pub use steps::{STAGING_RESOURCES, Step};
