//! Rule evaluation and action dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use atelier_core::TenantId;

use crate::rule::{AutomationRule, RuleSource, TriggerContext, matches_conditions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("missing action parameter `{0}`")]
    MissingParam(&'static str),

    #[error("action failed: {0}")]
    Failed(String),
}

/// Executes one kind of action (`LOG`, `SEND_EMAIL`, ...).
pub trait ActionHandler: Send + Sync {
    fn execute(
        &self,
        tenant_id: TenantId,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

/// Queue of emails waiting for a sender. Nothing here delivers them.
pub trait Outbox: Send + Sync {
    fn push(&self, tenant_id: TenantId, email: OutboundEmail) -> Result<(), ActionError>;
    fn list(&self, tenant_id: TenantId) -> Vec<OutboundEmail>;
}

#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    inner: RwLock<HashMap<TenantId, Vec<OutboundEmail>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Outbox for InMemoryOutbox {
    fn push(&self, tenant_id: TenantId, email: OutboundEmail) -> Result<(), ActionError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| ActionError::Failed("outbox lock poisoned".to_string()))?;
        map.entry(tenant_id).or_default().push(email);
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> Vec<OutboundEmail> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(&tenant_id).cloned())
            .unwrap_or_default()
    }
}

pub struct LogAction;

impl ActionHandler for LogAction {
    fn execute(
        &self,
        tenant_id: TenantId,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> Result<(), ActionError> {
        let message = rule.action_params.get("message").and_then(Value::as_str).unwrap_or("");
        info!(
            tenant_id = %tenant_id,
            rule = %rule.name,
            entity = %rule.trigger_entity,
            event = %rule.trigger_event,
            entity_id = ?context.entity_id,
            message,
            "automation rule fired"
        );
        Ok(())
    }
}

pub struct SendEmailAction {
    outbox: Arc<dyn Outbox>,
}

impl SendEmailAction {
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self { outbox }
    }
}

fn param<'a>(rule: &'a AutomationRule, key: &'static str) -> Option<&'a str> {
    rule.action_params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl ActionHandler for SendEmailAction {
    fn execute(
        &self,
        tenant_id: TenantId,
        rule: &AutomationRule,
        _context: &TriggerContext,
    ) -> Result<(), ActionError> {
        let to = param(rule, "to").ok_or(ActionError::MissingParam("to"))?;
        if !to.contains('@') {
            return Err(ActionError::Failed(format!("invalid recipient {to}")));
        }
        self.outbox.push(
            tenant_id,
            OutboundEmail {
                id: Uuid::now_v7(),
                rule_id: rule.id,
                to: to.to_string(),
                subject: param(rule, "subject").unwrap_or(&rule.name).to_string(),
                body: param(rule, "body").unwrap_or_default().to_string(),
                queued_at: Utc::now(),
            },
        )
    }
}

/// Outcome of one trigger.
///
/// `skipped` counts rules whose conditions did not hold and matched rules with
/// no registered handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub matched: usize,
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct RuleEngine {
    rules: Arc<dyn RuleSource>,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl RuleEngine {
    pub fn new(rules: Arc<dyn RuleSource>) -> Self {
        Self {
            rules,
            handlers: HashMap::new(),
        }
    }

    /// Engine with `LOG` and `SEND_EMAIL` registered.
    pub fn with_builtins(rules: Arc<dyn RuleSource>, outbox: Arc<dyn Outbox>) -> Self {
        let mut engine = Self::new(rules);
        engine.register("LOG", Arc::new(LogAction));
        engine.register("SEND_EMAIL", Arc::new(SendEmailAction::new(outbox)));
        engine
    }

    pub fn register(&mut self, action_type: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.trim().to_uppercase(), handler);
    }

    #[instrument(skip(self, context), fields(tenant_id = %tenant_id))]
    pub fn run_rules(
        &self,
        tenant_id: TenantId,
        entity: &str,
        event: &str,
        context: &TriggerContext,
    ) -> RunReport {
        let entity = entity.to_uppercase();
        let event = event.to_uppercase();
        let mut report = RunReport::default();

        for rule in self.rules.find_enabled(tenant_id, &entity, &event) {
            if !matches_conditions(&rule, context) {
                report.skipped += 1;
                continue;
            }
            report.matched += 1;

            let action = rule.action_type.to_uppercase();
            let Some(handler) = self.handlers.get(&action) else {
                debug!(rule = %rule.name, action = %action, "no handler for action type");
                report.skipped += 1;
                continue;
            };

            match handler.execute(tenant_id, &rule, context) {
                Ok(()) => report.executed += 1,
                Err(err) => {
                    warn!(rule = %rule.name, action = %action, error = %err, "automation action failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDraft;
    use serde_json::json;

    struct Fixed(Vec<AutomationRule>);

    impl RuleSource for Fixed {
        fn find_enabled(&self, _tenant_id: TenantId, entity: &str, event: &str) -> Vec<AutomationRule> {
            self.0
                .iter()
                .filter(|r| r.enabled && r.trigger_entity == entity && r.trigger_event == event)
                .cloned()
                .collect()
        }
    }

    fn rule(action: &str, params: Value, status: Option<&str>) -> AutomationRule {
        RuleDraft {
            name: format!("{action} rule"),
            trigger_entity: "INVOICE".to_string(),
            trigger_event: "PAID".to_string(),
            condition_status: status.map(str::to_string),
            action_type: action.to_string(),
            action_params: Some(params),
            ..RuleDraft::default()
        }
        .into_rule(Uuid::now_v7())
        .unwrap()
    }

    #[test]
    fn send_email_queues_in_outbox() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let rules = Fixed(vec![rule(
            "send_email",
            json!({"to": "boss@example.com", "subject": "Paid!"}),
            None,
        )]);
        let engine = RuleEngine::with_builtins(Arc::new(rules), outbox.clone());
        let tenant_id = TenantId::new();

        let report = engine.run_rules(tenant_id, "invoice", "paid", &TriggerContext::default());
        assert_eq!(report, RunReport { matched: 1, executed: 1, failed: 0, skipped: 0 });

        let queued = outbox.list(tenant_id);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].subject, "Paid!");
        assert!(outbox.list(TenantId::new()).is_empty());
    }

    #[test]
    fn failures_and_unknown_actions_do_not_stop_the_loop() {
        let rules = Fixed(vec![
            rule("send_email", json!({}), None),
            rule("webhook", json!({}), None),
            rule("log", json!({"message": "hi"}), Some("PAID")),
            rule("log", json!({}), Some("DRAFT")),
        ]);
        let engine = RuleEngine::with_builtins(Arc::new(rules), Arc::new(InMemoryOutbox::new()));
        let ctx = TriggerContext {
            status: Some("PAID".to_string()),
            ..TriggerContext::default()
        };

        let report = engine.run_rules(TenantId::new(), "INVOICE", "PAID", &ctx);
        assert_eq!(report, RunReport { matched: 3, executed: 1, failed: 1, skipped: 2 });
    }

    #[test]
    fn other_triggers_are_ignored() {
        let rules = Fixed(vec![rule("log", json!({}), None)]);
        let engine = RuleEngine::with_builtins(Arc::new(rules), Arc::new(InMemoryOutbox::new()));
        let report = engine.run_rules(TenantId::new(), "INVOICE", "CREATED", &TriggerContext::default());
        assert_eq!(report, RunReport::default());
    }
}
