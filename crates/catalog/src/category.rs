use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{normalize_code, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelier_events::Event;

pub const CATEGORY_AGGREGATE: &str = "catalog.category";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a product category, optionally nested under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    tenant_id: Option<TenantId>,
    code: String,
    label: String,
    parent_id: Option<CategoryId>,
    version: u64,
    created: bool,
}

impl Category {
    pub fn empty(id: CategoryId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            label: String::new(),
            parent_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent_id(&self) -> Option<CategoryId> {
        self.parent_id
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub code: String,
    pub label: String,
    pub parent_id: Option<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCategory {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryCommand {
    Create(CreateCategory),
    Rename(RenameCategory),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub code: String,
    pub label: String,
    pub parent_id: Option<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRenamed {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryEvent {
    Created(CategoryCreated),
    Renamed(CategoryRenamed),
}

impl Event for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::Created(_) => "catalog.category.created",
            CategoryEvent::Renamed(_) => "catalog.category.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CategoryEvent::Created(e) => e.occurred_at,
            CategoryEvent::Renamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Category {
    type Command = CategoryCommand;
    type Event = CategoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CategoryEvent::Created(e) => {
                self.id = e.category_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.label = e.label.clone();
                self.parent_id = e.parent_id;
                self.created = true;
            }
            CategoryEvent::Renamed(e) => self.label = e.label.clone(),
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CategoryCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("category already exists"));
                }
                if cmd.parent_id == Some(cmd.category_id) {
                    return Err(DomainError::validation("a category cannot be its own parent"));
                }
                Ok(vec![CategoryEvent::Created(CategoryCreated {
                    tenant_id: cmd.tenant_id,
                    category_id: cmd.category_id,
                    code: normalize_code(&cmd.code, "code")?,
                    label: required_text(&cmd.label, "label")?,
                    parent_id: cmd.parent_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::Rename(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                Ok(vec![CategoryEvent::Renamed(CategoryRenamed {
                    tenant_id: cmd.tenant_id,
                    category_id: cmd.category_id,
                    label: required_text(&cmd.label, "label")?,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;

    #[test]
    fn create_then_rename() {
        let tenant_id = TenantId::new();
        let id = CategoryId::new(AggregateId::new());
        let mut c = Category::empty(id);
        execute(
            &mut c,
            &CategoryCommand::Create(CreateCategory {
                tenant_id,
                category_id: id,
                code: "viennoiserie".to_string(),
                label: "Viennoiseries".to_string(),
                parent_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(c.code(), "VIENNOISERIE");

        execute(
            &mut c,
            &CategoryCommand::Rename(RenameCategory {
                tenant_id,
                category_id: id,
                label: "Pastries".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(c.label(), "Pastries");
        assert_eq!(c.version(), 2);
    }

    #[test]
    fn self_parent_is_rejected() {
        let id = CategoryId::new(AggregateId::new());
        let c = Category::empty(id);
        let err = c
            .handle(&CategoryCommand::Create(CreateCategory {
                tenant_id: TenantId::new(),
                category_id: id,
                code: "X".to_string(),
                label: "X".to_string(),
                parent_id: Some(id),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
