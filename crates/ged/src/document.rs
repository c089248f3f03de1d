use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::required_text;
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use atelier_events::Event;

pub const DOCUMENT_AGGREGATE: &str = "ged.document";

const FALLBACK_FILE_NAME: &str = "document";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

impl DocumentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return FALLBACK_FILE_NAME.to_string();
    }
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// `<tenant>/<blob>_<sanitised name>`.
pub fn storage_key(tenant_id: TenantId, blob_id: AggregateId, file_name: &str) -> String {
    format!("{tenant_id}/{blob_id}_{}", sanitize_file_name(file_name))
}

/// Free-form link to the record a document is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: &str, entity_id: &str) -> Result<Self, DomainError> {
        Ok(Self {
            entity_type: required_text(entity_type, "entity_type")?.to_lowercase(),
            entity_id: required_text(entity_id, "entity_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub entity: EntityRef,
    pub file_name: String,
    pub storage_key: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size: u64,
    pub version: u32,
    pub uploaded_by: Option<UserId>,
}

/// Aggregate root: a stored file attached to a business record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    tenant_id: Option<TenantId>,
    meta: Option<DocumentMeta>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Document {
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            tenant_id: None,
            meta: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn meta(&self) -> Option<&DocumentMeta> {
        self.meta.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDocument {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub meta: DocumentMeta,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDocument {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentCommand {
    Upload(UploadDocument),
    Delete(DeleteDocument),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUploaded {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub meta: DocumentMeta,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDeleted {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub storage_key: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    Uploaded(DocumentUploaded),
    Deleted(DocumentDeleted),
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::Uploaded(_) => "ged.document.uploaded",
            DocumentEvent::Deleted(_) => "ged.document.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::Uploaded(e) => e.occurred_at,
            DocumentEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Document {
    type Command = DocumentCommand;
    type Event = DocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DocumentEvent::Uploaded(e) => {
                self.id = e.document_id;
                self.tenant_id = Some(e.tenant_id);
                self.meta = Some(e.meta.clone());
                self.created = true;
            }
            DocumentEvent::Deleted(_) => self.deleted = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DocumentCommand::Upload(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("document already exists"));
                }
                let meta = &cmd.meta;
                if meta.version < 1 {
                    return Err(DomainError::validation("document version starts at 1"));
                }
                Ok(vec![DocumentEvent::Uploaded(DocumentUploaded {
                    tenant_id: cmd.tenant_id,
                    document_id: cmd.document_id,
                    meta: DocumentMeta {
                        entity: EntityRef::new(&meta.entity.entity_type, &meta.entity.entity_id)?,
                        file_name: match meta.file_name.trim() {
                            "" => FALLBACK_FILE_NAME.to_string(),
                            name => name.to_string(),
                        },
                        storage_key: required_text(&meta.storage_key, "storage_key")?,
                        ..meta.clone()
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            DocumentCommand::Delete(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                if self.deleted {
                    return Err(DomainError::not_found());
                }
                let storage_key = self.meta.as_ref().map(|m| m.storage_key.clone()).unwrap_or_default();
                Ok(vec![DocumentEvent::Deleted(DocumentDeleted {
                    tenant_id: cmd.tenant_id,
                    document_id: cmd.document_id,
                    storage_key,
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
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("Devis n°12 (final).pdf"), "Devis_n_12__final_.pdf");
        assert_eq!(sanitize_file_name("   "), "document");
        let tenant = TenantId::new();
        let blob = AggregateId::new();
        assert_eq!(storage_key(tenant, blob, "a b.txt"), format!("{tenant}/{blob}_a_b.txt"));
    }

    #[test]
    fn upload_then_delete() {
        let tenant_id = TenantId::new();
        let id = DocumentId::new(AggregateId::new());
        let mut doc = Document::empty(id);
        execute(
            &mut doc,
            &DocumentCommand::Upload(UploadDocument {
                tenant_id,
                document_id: id,
                meta: DocumentMeta {
                    entity: EntityRef::new("Invoice", "42").unwrap(),
                    file_name: "scan.pdf".to_string(),
                    storage_key: storage_key(tenant_id, AggregateId::new(), "scan.pdf"),
                    mime_type: Some("application/pdf".to_string()),
                    size: 1_024,
                    version: 2,
                    uploaded_by: None,
                },
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(doc.meta().unwrap().entity.entity_type, "invoice");

        let delete = DocumentCommand::Delete(DeleteDocument {
            tenant_id,
            document_id: id,
            occurred_at: Utc::now(),
        });
        let events = execute(&mut doc, &delete).unwrap();
        assert!(matches!(&events[0], DocumentEvent::Deleted(e) if e.storage_key.ends_with("_scan.pdf")));
        assert!(doc.is_deleted());
        assert_eq!(doc.handle(&delete).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn version_zero_is_rejected() {
        let id = DocumentId::new(AggregateId::new());
        let err = Document::empty(id)
            .handle(&DocumentCommand::Upload(UploadDocument {
                tenant_id: TenantId::new(),
                document_id: id,
                meta: DocumentMeta {
                    entity: EntityRef::new("ticket", "1").unwrap(),
                    file_name: "x".to_string(),
                    storage_key: "k".to_string(),
                    mime_type: None,
                    size: 0,
                    version: 0,
                    uploaded_by: None,
                },
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
