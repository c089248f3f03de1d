use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::error::{normalize_code, optional_text, required_text};
use atelier_core::{DomainError, DomainResult, TenantId};

pub const DEFAULT_MODULE_VERSION: &str = "1.0.0";

/// A bundle of custom entities published by one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub version: String,
    pub author_tenant_id: TenantId,
    pub is_public: bool,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ModuleDraft {
    pub fn into_definition(
        self,
        id: Uuid,
        author_tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> DomainResult<ModuleDefinition> {
        Ok(ModuleDefinition {
            id,
            code: normalize_code(&self.code, "code")?,
            name: required_text(&self.name, "name")?,
            version: optional_text(self.version.as_deref())
                .unwrap_or_else(|| DEFAULT_MODULE_VERSION.to_string()),
            author_tenant_id,
            is_public: self.is_public,
            description: optional_text(self.description.as_deref()),
            published_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Allowed values of a SELECT field.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEntityDefinition {
    pub id: Uuid,
    pub module_code: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub list_columns: Vec<String>,
}

impl CustomEntityDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub list_columns: Vec<String>,
}

impl EntityDraft {
    pub fn into_definition(self, id: Uuid, module_code: &str) -> DomainResult<CustomEntityDefinition> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for f in self.fields {
            let name = required_text(&f.name, "field name")?;
            if fields.iter().any(|existing: &FieldDef| existing.name == name) {
                return Err(DomainError::validation(format!("duplicate field {name}")));
            }
            if f.field_type == FieldType::Select && f.options.is_empty() {
                return Err(DomainError::validation(format!("select field {name} needs options")));
            }
            fields.push(FieldDef {
                name,
                label: optional_text(f.label.as_deref()),
                ..f
            });
        }
        for column in &self.list_columns {
            if !fields.iter().any(|f| &f.name == column) {
                return Err(DomainError::validation(format!("unknown list column {column}")));
            }
        }
        Ok(CustomEntityDefinition {
            id,
            module_code: normalize_code(module_code, "module_code")?,
            code: normalize_code(&self.code, "code")?,
            name: required_text(&self.name, "name")?,
            description: optional_text(self.description.as_deref()),
            fields,
            list_columns: self.list_columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, field_type: FieldType) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            label: None,
            field_type,
            required: false,
            options: vec![],
        }
    }

    #[test]
    fn module_version_defaults() {
        let m = ModuleDraft {
            code: "fleet".to_string(),
            name: "Fleet".to_string(),
            ..ModuleDraft::default()
        }
        .into_definition(Uuid::now_v7(), TenantId::new(), Utc::now())
        .unwrap();
        assert_eq!(m.code, "FLEET");
        assert_eq!(m.version, DEFAULT_MODULE_VERSION);
    }

    #[test]
    fn select_without_options_is_rejected() {
        let draft = EntityDraft {
            code: "vehicle".to_string(),
            name: "Vehicle".to_string(),
            fields: vec![field("fuel", FieldType::Select)],
            ..EntityDraft::default()
        };
        assert!(matches!(draft.into_definition(Uuid::now_v7(), "fleet"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn list_columns_must_name_fields() {
        let draft = EntityDraft {
            code: "vehicle".to_string(),
            name: "Vehicle".to_string(),
            fields: vec![field("plate", FieldType::Text)],
            list_columns: vec!["plate".to_string(), "colour".to_string()],
            ..EntityDraft::default()
        };
        match draft.into_definition(Uuid::now_v7(), "fleet") {
            Err(DomainError::Validation(msg)) if msg.contains("colour") => {}
            other => panic!("Expected validation error, got {other:?}"),
        }
    }
}
