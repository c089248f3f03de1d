use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use atelier_core::error::{optional_text, required_text};
use atelier_core::{AggregateId, DomainError, DomainResult, TenantId};

/// A tenant's "when X happens and Y holds, do Z" rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger_entity: String,
    pub trigger_event: String,
    #[serde(default)]
    pub condition_status: Option<String>,
    #[serde(default)]
    pub condition_amount_min: Option<i64>,
    #[serde(default)]
    pub condition_amount_max: Option<i64>,
    #[serde(default)]
    pub condition_third_party_id: Option<AggregateId>,
    pub action_type: String,
    #[serde(default)]
    pub action_params: Map<String, Value>,
    pub enabled: bool,
}

/// Rule as submitted by a client, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger_entity: String,
    pub trigger_event: String,
    #[serde(default)]
    pub condition_status: Option<String>,
    #[serde(default)]
    pub condition_amount_min: Option<i64>,
    #[serde(default)]
    pub condition_amount_max: Option<i64>,
    #[serde(default)]
    pub condition_third_party_id: Option<AggregateId>,
    pub action_type: String,
    #[serde(default)]
    pub action_params: Option<Value>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn upper(value: &str, field: &str) -> DomainResult<String> {
    Ok(required_text(value, field)?.to_uppercase())
}

impl RuleDraft {
    pub fn into_rule(self, id: Uuid) -> DomainResult<AutomationRule> {
        if let (Some(min), Some(max)) = (self.condition_amount_min, self.condition_amount_max) {
            if min > max {
                return Err(DomainError::validation("condition_amount_min exceeds condition_amount_max"));
            }
        }
        let action_params = match self.action_params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(DomainError::validation("action_params must be an object")),
        };
        Ok(AutomationRule {
            id,
            name: required_text(&self.name, "name")?,
            description: optional_text(self.description.as_deref()),
            trigger_entity: upper(&self.trigger_entity, "trigger_entity")?,
            trigger_event: upper(&self.trigger_event, "trigger_event")?,
            condition_status: optional_text(self.condition_status.as_deref()).map(|s| s.to_uppercase()),
            condition_amount_min: self.condition_amount_min,
            condition_amount_max: self.condition_amount_max,
            condition_third_party_id: self.condition_third_party_id,
            action_type: upper(&self.action_type, "action_type")?,
            action_params,
            enabled: self.enabled,
        })
    }
}

/// Facts about the record that fired the trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub entity_id: Option<AggregateId>,
    pub third_party_id: Option<AggregateId>,
}

/// Every condition set on the rule must hold. A bound on the amount fails when
/// the context carries no amount.
pub fn matches_conditions(rule: &AutomationRule, context: &TriggerContext) -> bool {
    if let Some(expected) = &rule.condition_status {
        match &context.status {
            Some(actual) if actual.eq_ignore_ascii_case(expected) => {}
            _ => return false,
        }
    }

    if rule.condition_amount_min.is_some() || rule.condition_amount_max.is_some() {
        let Some(amount) = context.amount else {
            return false;
        };
        if rule.condition_amount_min.is_some_and(|min| amount < min) {
            return false;
        }
        if rule.condition_amount_max.is_some_and(|max| amount > max) {
            return false;
        }
    }

    if let Some(expected) = rule.condition_third_party_id {
        if context.third_party_id != Some(expected) {
            return false;
        }
    }

    true
}

/// Where the engine reads rules from.
pub trait RuleSource: Send + Sync {
    /// Enabled rules of `tenant_id` for the (upper-cased) entity and event.
    fn find_enabled(&self, tenant_id: TenantId, entity: &str, event: &str) -> Vec<AutomationRule>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rule() -> AutomationRule {
        RuleDraft {
            name: " Big invoices ".to_string(),
            trigger_entity: "invoice".to_string(),
            trigger_event: "validated".to_string(),
            action_type: "log".to_string(),
            ..RuleDraft::default()
        }
        .into_rule(Uuid::now_v7())
        .unwrap()
    }

    #[test]
    fn draft_is_normalised() {
        let r = rule();
        assert_eq!(r.name, "Big invoices");
        assert_eq!(r.trigger_entity, "INVOICE");
        assert_eq!(r.trigger_event, "VALIDATED");
        assert_eq!(r.action_type, "LOG");
        assert!(r.action_params.is_empty());
    }

    #[test]
    fn non_object_params_are_rejected() {
        let draft = RuleDraft {
            name: "x".to_string(),
            trigger_entity: "invoice".to_string(),
            trigger_event: "paid".to_string(),
            action_type: "log".to_string(),
            action_params: Some(serde_json::json!([1, 2])),
            ..RuleDraft::default()
        };
        assert!(matches!(draft.into_rule(Uuid::now_v7()), Err(DomainError::Validation(_))));
    }

    #[test]
    fn unconditional_rule_matches_anything() {
        assert!(matches_conditions(&rule(), &TriggerContext::default()));
    }

    #[test]
    fn status_comparison_ignores_case() {
        let mut r = rule();
        r.condition_status = Some("PAID".to_string());
        let ctx = TriggerContext {
            status: Some("paid".to_string()),
            ..TriggerContext::default()
        };
        assert!(matches_conditions(&r, &ctx));
        assert!(!matches_conditions(&r, &TriggerContext::default()));
    }

    #[test]
    fn amount_bound_without_amount_fails() {
        let mut r = rule();
        r.condition_amount_min = Some(100_00);
        assert!(!matches_conditions(&r, &TriggerContext::default()));
    }

    #[test]
    fn third_party_must_match() {
        let mut r = rule();
        let tp = AggregateId::new();
        r.condition_third_party_id = Some(tp);
        let ctx = TriggerContext {
            third_party_id: Some(AggregateId::new()),
            ..TriggerContext::default()
        };
        assert!(!matches_conditions(&r, &ctx));
        let ctx = TriggerContext {
            third_party_id: Some(tp),
            ..ctx
        };
        assert!(matches_conditions(&r, &ctx));
    }

    proptest! {
        #[test]
        fn amount_bounds_are_inclusive(min in -1_000_000i64..1_000_000, span in 0i64..1_000_000, amount in -3_000_000i64..3_000_000) {
            let mut r = rule();
            r.condition_amount_min = Some(min);
            r.condition_amount_max = Some(min + span);
            let ctx = TriggerContext { amount: Some(amount), ..TriggerContext::default() };
            prop_assert_eq!(matches_conditions(&r, &ctx), amount >= min && amount <= min + span);
        }
    }
}
