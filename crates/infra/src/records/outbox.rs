use atelier_automation::{ActionError, OutboundEmail, Outbox};
use atelier_core::TenantId;

use super::{RecordBackend, Records};

/// `Outbox` kept in a record store, so queued mail survives restarts on Postgres.
#[derive(Clone)]
pub struct StoredOutbox {
    store: Records<OutboundEmail>,
}

impl StoredOutbox {
    pub fn new(backend: &RecordBackend) -> Self {
        Self {
            store: backend.store("automation_outbox"),
        }
    }
}

impl Outbox for StoredOutbox {
    fn push(&self, tenant_id: TenantId, email: OutboundEmail) -> Result<(), ActionError> {
        self.store
            .upsert(tenant_id, email.id.to_string(), email)
            .map_err(|e| ActionError::Failed(e.to_string()))
    }

    /// Oldest first.
    fn list(&self, tenant_id: TenantId) -> Vec<OutboundEmail> {
        let mut emails = self.store.list(tenant_id);
        emails.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.id.cmp(&b.id)));
        emails
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn queued_mail_that_cannot_be_stored_fails_the_action() {
        let outbox = StoredOutbox {
            store: Arc::new(crate::records::Unwritable),
        };
        let t = TenantId::new();
        let email = OutboundEmail {
            id: Uuid::now_v7(),
            rule_id: Uuid::now_v7(),
            to: "ops@example.com".to_string(),
            subject: "Invoice validated".to_string(),
            body: String::new(),
            queued_at: Utc::now(),
        };

        let err = outbox.push(t, email).unwrap_err();
        assert!(matches!(err, ActionError::Failed(msg) if msg.contains("connection refused")));
        assert!(outbox.list(t).is_empty());
    }
}
