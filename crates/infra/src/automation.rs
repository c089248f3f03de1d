//! Feeds committed events into the tenant's automation rules.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use tracing::debug;

use atelier_automation::{RuleEngine, RunReport, trigger_for};
use atelier_events::{EventBus, JsonEnvelope};
use atelier_tenancy::CurrentTenant;

use crate::workers::{BusWorker, WorkerHandle};

/// Runs the rules fired by one envelope inside the envelope's tenant context.
/// `None` when the event is not a rule trigger.
pub fn run_for_envelope(engine: &RuleEngine, envelope: &JsonEnvelope) -> Option<RunReport> {
    let trigger = trigger_for(envelope)?;
    let tenant_id = envelope.tenant_id();
    let report = CurrentTenant::sync_scope(tenant_id, || {
        engine.run_rules(tenant_id, trigger.entity, trigger.event, &trigger.context)
    });
    debug!(
        tenant_id = %tenant_id,
        entity = trigger.entity,
        event = trigger.event,
        matched = report.matched,
        executed = report.executed,
        "automation rules evaluated"
    );
    Some(report)
}

pub struct AutomationWorker;

impl AutomationWorker {
    /// Subscribes before returning, so every event published afterwards is seen.
    pub fn spawn<B>(bus: B, engine: Arc<RuleEngine>) -> io::Result<WorkerHandle>
    where
        B: EventBus<JsonEnvelope>,
    {
        // Postgres-backed rule stores bridge into the runtime that spawned us.
        let runtime = tokio::runtime::Handle::try_current().ok();
        BusWorker::spawn("automation", bus, None, move |envelope: JsonEnvelope| {
            let _entered = runtime.as_ref().map(|h| h.enter());
            run_for_envelope(&engine, &envelope);
            Ok::<(), Infallible>(())
        })
    }
}
