use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use atelier_core::{DomainError, TenantId};

use crate::definition::{CustomEntityDefinition, FieldDef, FieldType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NocodeError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("record belongs to another tenant")]
    TenantMismatch,

    #[error("module {0} not found")]
    ModuleNotFound(String),

    #[error("entity {module}/{entity} not found")]
    EntityNotFound { module: String, entity: String },

    #[error("record not found")]
    RecordNotFound,

    #[error("no-code store failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub definition_id: Uuid,
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomRecord {
    /// Build a record after checking `payload` against the definition.
    pub fn create(
        id: Uuid,
        tenant_id: TenantId,
        definition: &CustomEntityDefinition,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<Self, NocodeError> {
        let payload = validate_payload(definition, payload)?;
        Ok(Self {
            id,
            tenant_id,
            definition_id: definition.id,
            payload,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn ensure_owned_by(&self, tenant_id: TenantId) -> Result<(), NocodeError> {
        if self.tenant_id == tenant_id {
            Ok(())
        } else {
            Err(NocodeError::TenantMismatch)
        }
    }

    pub fn replace_payload(
        &mut self,
        tenant_id: TenantId,
        definition: &CustomEntityDefinition,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<(), NocodeError> {
        self.ensure_owned_by(tenant_id)?;
        self.payload = validate_payload(definition, payload)?;
        self.updated_at = now;
        Ok(())
    }
}

fn check_field(field: &FieldDef, value: &Value) -> Result<(), String> {
    let name = &field.name;
    let ok = match field.field_type {
        FieldType::Text => value.is_string(),
        FieldType::Number => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        FieldType::Date => value
            .as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Select => value.as_str().is_some_and(|s| field.options.iter().any(|o| o == s)),
        FieldType::Email => value.as_str().is_some_and(|s| s.contains('@')),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{name}: expected {:?}", field.field_type).to_lowercase())
    }
}

/// Check a record payload against its entity's field schema. Every problem is
/// reported in one validation error.
pub fn validate_payload(
    definition: &CustomEntityDefinition,
    payload: Value,
) -> Result<Map<String, Value>, DomainError> {
    let Value::Object(map) = payload else {
        return Err(DomainError::validation("payload must be a JSON object"));
    };

    let mut problems = Vec::new();

    for field in &definition.fields {
        match map.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    problems.push(format!("{} is required", field.name));
                }
            }
            Some(value) => {
                if let Err(p) = check_field(field, value) {
                    problems.push(p);
                }
            }
        }
    }

    for key in map.keys() {
        if definition.field(key).is_none() {
            problems.push(format!("unknown field {key}"));
        }
    }

    if problems.is_empty() {
        Ok(map)
    } else {
        Err(DomainError::validation(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vehicle() -> CustomEntityDefinition {
        let f = |name: &str, field_type, required, options: &[&str]| FieldDef {
            name: name.to_string(),
            label: None,
            field_type,
            required,
            options: options.iter().map(|s| s.to_string()).collect(),
        };
        CustomEntityDefinition {
            id: Uuid::now_v7(),
            module_code: "FLEET".to_string(),
            code: "VEHICLE".to_string(),
            name: "Vehicle".to_string(),
            description: None,
            fields: vec![
                f("plate", FieldType::Text, true, &[]),
                f("seats", FieldType::Number, false, &[]),
                f("registered_on", FieldType::Date, false, &[]),
                f("electric", FieldType::Boolean, false, &[]),
                f("fuel", FieldType::Select, false, &["petrol", "diesel"]),
                f("driver_email", FieldType::Email, false, &[]),
            ],
            list_columns: vec!["plate".to_string()],
        }
    }

    #[test]
    fn valid_payload_passes() {
        let payload = json!({
            "plate": "AB-123-CD",
            "seats": "5",
            "registered_on": "2024-02-29",
            "electric": false,
            "fuel": "diesel",
            "driver_email": "jo@example.com",
        });
        let map = validate_payload(&vehicle(), payload).unwrap();
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn every_problem_is_reported() {
        let payload = json!({
            "seats": "five",
            "registered_on": "29/02/2024",
            "fuel": "electric",
            "colour": "red",
        });
        match validate_payload(&vehicle(), payload) {
            Err(DomainError::Validation(msg)) => {
                for needle in ["plate is required", "seats", "registered_on", "fuel", "unknown field colour"] {
                    assert!(msg.contains(needle), "{msg} should mention {needle}");
                }
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let err = validate_payload(&vehicle(), json!({"plate": null})).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("plate is required")));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(validate_payload(&vehicle(), json!(["plate"])).is_err());
    }

    #[test]
    fn records_are_tenant_owned() {
        let def = vehicle();
        let owner = TenantId::new();
        let mut rec = CustomRecord::create(Uuid::now_v7(), owner, &def, json!({"plate": "X"}), Utc::now()).unwrap();
        let err = rec
            .replace_payload(TenantId::new(), &def, json!({"plate": "Y"}), Utc::now())
            .unwrap_err();
        assert_eq!(err, NocodeError::TenantMismatch);
        rec.replace_payload(owner, &def, json!({"plate": "Y"}), Utc::now()).unwrap();
        assert_eq!(rec.payload["plate"], "Y");
    }
}
