//! Normalization of backend ingestion state
//!
//! Backends report a document's ingestion state under different fields. This is
//! the one place that turns a record into an [`UploadStatus`]; the field
//! precedence is part of the observable behavior and must not change.

use crate::api::{DocumentRecord, UploadDocumentResponse};
use crate::models::{Document, UploadStatus};

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|label| !label.trim().is_empty())
}

/// Canonical status of a listed document.
///
/// Precedence: `upload_status`, `processingStatus`, `status`, then
/// `completed` when chunks were indexed, otherwise `processing`.
pub fn normalize_status(record: &DocumentRecord) -> UploadStatus {
    if let Some(label) = present(&record.upload_status)
        .or_else(|| present(&record.processing_status))
        .or_else(|| present(&record.status))
    {
        return UploadStatus::from_label(label);
    }

    if record.chunks_indexed > 0 {
        UploadStatus::Completed
    } else {
        UploadStatus::Processing
    }
}

/// Convert a listed record into the local document shape
pub fn document_from_record(session_id: &str, record: &DocumentRecord) -> Document {
    Document {
        document_id: record.document_id.clone(),
        file_name: record.file_name.clone(),
        storage_key: record.storage_key.clone().unwrap_or_default(),
        page_count: record.page_count,
        chunks_indexed: record.chunks_indexed,
        session_id: session_id.to_string(),
        upload_status: normalize_status(record),
    }
}

/// Provisional document built from an accepted upload
pub fn document_from_upload(session_id: &str, uploaded: &UploadDocumentResponse) -> Document {
    let upload_status = present(&uploaded.status)
        .map(UploadStatus::from_label)
        .unwrap_or(UploadStatus::Processing);

    Document {
        document_id: uploaded.document_id.clone(),
        file_name: uploaded.file_name.clone(),
        storage_key: uploaded.storage_key.clone().unwrap_or_default(),
        page_count: uploaded.page_count,
        chunks_indexed: uploaded.chunks_indexed,
        session_id: session_id.to_string(),
        upload_status,
    }
}
