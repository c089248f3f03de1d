//! GED: documents attached to business records, and the blob storage contract.

pub mod document;
pub mod storage;

pub use document::{
    DOCUMENT_AGGREGATE, DeleteDocument, Document, DocumentCommand, DocumentDeleted, DocumentEvent,
    DocumentId, DocumentMeta, DocumentUploaded, EntityRef, UploadDocument, sanitize_file_name,
    storage_key,
};
pub use storage::{DocumentStorage, StorageError, check_key};
