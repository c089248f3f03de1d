//! `atelier-automation`: tenant-defined rules fired by business events.

pub mod engine;
pub mod rule;
pub mod trigger;

pub use engine::{
    ActionError, ActionHandler, InMemoryOutbox, LogAction, OutboundEmail, Outbox, RuleEngine,
    RunReport, SendEmailAction,
};
pub use rule::{AutomationRule, RuleDraft, RuleSource, TriggerContext, matches_conditions};
pub use trigger::{Trigger, trigger_for};
