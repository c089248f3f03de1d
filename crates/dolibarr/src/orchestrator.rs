use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use atelier_core::{TenantId, UserId};
use atelier_tenancy::CurrentTenant;

use crate::client::{ClientError, DolibarrClient, DolibarrSource};
use crate::run::{ImportConfig, ImportLog, ImportRun, LogLevel, RunStatus, RunStore};
use crate::sink::{ImportError, ImportSink};
use crate::steps::{Importer, Step};

pub type Connector =
    Arc<dyn Fn(&ImportConfig) -> Result<Arc<dyn DolibarrSource>, ClientError> + Send + Sync>;

fn http_connector() -> Connector {
    Arc::new(|config: &ImportConfig| {
        let client = DolibarrClient::new(&config.base_url, &config.api_key)?;
        Ok(Arc::new(client) as Arc<dyn DolibarrSource>)
    })
}

/// Runs a full Dolibarr import for one tenant, step by step.
#[derive(Clone)]
pub struct ImportOrchestrator {
    sink: Arc<dyn ImportSink>,
    runs: Arc<dyn RunStore>,
    connector: Connector,
}

impl ImportOrchestrator {
    pub fn new(sink: Arc<dyn ImportSink>, runs: Arc<dyn RunStore>) -> Self {
        Self {
            sink,
            runs,
            connector: http_connector(),
        }
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        &self.runs
    }

    fn connect(&self, config: &ImportConfig) -> Result<Arc<dyn DolibarrSource>, ImportError> {
        if config.base_url.trim().is_empty() {
            return Err(ImportError::Config("Dolibarr URL is required".to_string()));
        }
        Ok((self.connector)(config)?)
    }

    pub async fn test_connection(&self, config: &ImportConfig) -> Result<(), ImportError> {
        let source = self.connect(config)?;
        source
            .get_list("thirdparties", &[("limit", "1"), ("sortfield", "t.rowid")])
            .await?;
        Ok(())
    }

    /// Step failures are logged and the run moves on; the final status says
    /// whether none, some or all of the steps failed. A failure to record the
    /// run itself ends it with an error.
    #[instrument(skip(self, config), fields(tenant_id = %tenant_id))]
    pub async fn run_import(
        &self,
        tenant_id: TenantId,
        config: &ImportConfig,
        started_by: Option<UserId>,
    ) -> Result<ImportRun, ImportError> {
        if tenant_id.is_nil() {
            return Err(ImportError::Config("tenant is required".to_string()));
        }
        let source = self.connect(config)?;

        CurrentTenant::scope(tenant_id, async move {
            let run = ImportRun::start(tenant_id, config, started_by, Utc::now());
            self.runs.save_run(&run)?;

            let mut importer = Importer::new(run, source.as_ref(), self.sink.as_ref(), self.runs.as_ref());
            importer.info("START", &format!("import from {}", config.base_url))?;

            let mut failed = 0;
            for step in Step::ALL {
                importer.run.counters_mut(step.code());
                match importer.run_step(step).await {
                    Ok(()) => {}
                    Err(err @ ImportError::Store(_)) => return Err(err),
                    Err(err) => {
                        warn!(step = step.code(), error = %err, "import step failed");
                        importer.error(step, None, &format!("step failed: {err}"))?;
                        failed += 1;
                    }
                }
                self.runs.save_run(&importer.run)?;
            }

            let mut run = importer.run;
            run.status = match failed {
                0 => RunStatus::Success,
                n if n == Step::ALL.len() => RunStatus::Failed,
                _ => RunStatus::Partial,
            };
            run.finished_at = Some(Utc::now());
            self.runs.save_run(&run)?;
            self.runs.append_log(
                tenant_id,
                ImportLog::new(
                    run.id,
                    "END",
                    LogLevel::Info,
                    &format!("import finished with status {:?}", run.status),
                ),
            )?;
            info!(run_id = %run.id, status = ?run.status, "Dolibarr import finished");
            Ok(run)
        })
        .await
    }
}
