//! Document commands: list and upload

use super::{require_login, resolve_session, store_failure};
use crate::api::UploadFile;
use crate::error::{Error, Result};
use crate::models::{Document, Session, UploadStatus};
use crate::progress::{ingestion_spinner, track_upload, upload_progress_bar};
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentList {
    pub session: Session,
    pub documents: Vec<Document>,
}

pub async fn cmd_list_documents(workspace: &Workspace, session_id: Option<&str>) -> Result<DocumentList> {
    require_login(workspace).await?;
    let session = resolve_session(workspace, session_id).await?;
    if let Some(error) = workspace.documents().error().await {
        return Err(Error::Other(error));
    }
    let documents = workspace.documents().documents(&session.session_id).await;
    Ok(DocumentList { session, documents })
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub path: PathBuf,
    pub session_id: Option<String>,
    /// Keep polling until the backend has indexed the document
    pub wait: bool,
    pub timeout: Duration,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub session_id: String,
    pub document: Document,
    /// False when `--wait` gave up before ingestion finished
    pub settled: bool,
}

pub async fn cmd_upload(workspace: &Workspace, options: UploadOptions) -> Result<UploadReport> {
    require_login(workspace).await?;
    let file = UploadFile::from_path(&options.path).await?;
    let session = resolve_session(workspace, options.session_id.as_deref()).await?;
    info!(session_id = %session.session_id, file = %file.file_name, "Uploading");

    let bar = options
        .show_progress
        .then(|| upload_progress_bar(&file.file_name));
    let tracker = bar.clone().map(|bar| {
        tokio::spawn(track_upload(bar, workspace.documents().subscribe_progress()))
    });

    let uploaded = workspace.upload_document(&file).await;

    if let Some(tracker) = tracker {
        tracker.abort();
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let mut document = match uploaded {
        Some(document) => document,
        None => {
            return Err(store_failure(
                workspace.documents().error().await,
                Error::Other(format!("Upload of {} failed", file.file_name)),
            ))
        }
    };

    let mut settled = !document.upload_status.is_pending();
    if options.wait && !settled {
        let spinner = options
            .show_progress
            .then(|| ingestion_spinner(&format!("Indexing {}", document.file_name)));

        let waited = tokio::time::timeout(
            options.timeout,
            workspace.documents().wait_for_polling(&session.session_id),
        )
        .await;

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        match waited {
            Ok(()) => settled = true,
            Err(_) => warn!(
                "Still indexing after {}s; check later with 'docchat docs list'",
                options.timeout.as_secs()
            ),
        }

        if let Some(latest) = workspace
            .documents()
            .documents(&session.session_id)
            .await
            .into_iter()
            .find(|doc| doc.document_id == document.document_id)
        {
            document = latest;
        }
    }

    Ok(UploadReport {
        session_id: session.session_id,
        document,
        settled,
    })
}

fn status_marker(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Completed => "✓",
        UploadStatus::Failed => "✗",
        UploadStatus::Uploading | UploadStatus::Processing => "…",
    }
}

pub fn print_documents(list: &DocumentList) {
    println!("📚 {} ({})\n", list.session.name, list.session.session_id);
    if list.documents.is_empty() {
        println!("No documents yet. Upload one with 'docchat docs upload <file.pdf>'.");
        return;
    }

    for doc in &list.documents {
        println!(
            "  {} {}  [{}] {} pages, {} chunks  ({})",
            status_marker(doc.upload_status),
            doc.file_name,
            doc.upload_status,
            doc.page_count,
            doc.chunks_indexed,
            doc.document_id
        );
    }
}

pub fn print_upload(report: &UploadReport) {
    let doc = &report.document;
    println!("✓ Uploaded {} ({})", doc.file_name, doc.document_id);
    println!("  Status: {}", doc.upload_status);
    if report.settled && doc.upload_status == UploadStatus::Completed {
        println!("  Indexed: {} pages, {} chunks", doc.page_count, doc.chunks_indexed);
    }
}
