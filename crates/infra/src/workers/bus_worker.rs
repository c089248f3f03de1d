use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use atelier_core::TenantId;
use atelier_events::{EventBus, Subscription, TenantScoped};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Thread that drains one bus subscription into a handler.
///
/// The handler must be idempotent: delivery is at-least-once.
#[derive(Debug)]
pub struct BusWorker;

impl BusWorker {
    /// `tenant_id`, when set, drops messages of every other tenant.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "bus worker handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "bus worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc::channel;

    use serde_json::json;
    use uuid::Uuid;

    use atelier_core::AggregateId;
    use atelier_events::{InMemoryEventBus, JsonEnvelope};

    fn envelope(tenant_id: TenantId) -> JsonEnvelope {
        JsonEnvelope::new(Uuid::now_v7(), tenant_id, AggregateId::new(), "x", 1, json!({}))
    }

    #[test]
    fn delivers_only_the_filtered_tenant() {
        let bus = Arc::new(InMemoryEventBus::<JsonEnvelope>::new());
        let (tx, rx) = channel();
        let tenant = TenantId::new();

        let handle = BusWorker::spawn("test-worker", bus.clone(), Some(tenant), move |env: JsonEnvelope| {
            tx.send(env.tenant_id()).map_err(|e| e.to_string())
        })
        .unwrap();

        bus.publish(envelope(TenantId::new())).unwrap();
        bus.publish(envelope(tenant)).unwrap();

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, tenant);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        handle.shutdown();
    }
}
