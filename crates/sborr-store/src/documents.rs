//! Document store: the local mirror of the `documents` table.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sborr_core::defaults::{
    DOCUMENTS_BUCKET, DOCUMENTS_TABLE, DOCUMENT_CONTENT_TYPE, MAX_UPLOAD_BYTES,
};
use sborr_core::file_safety::document_storage_path;
use sborr_core::{
    decode_rows, detect_content_type, validate_file, Backend, ChangeEvent, ChangeKind, Document,
    DocumentFilter, DocumentUpdate, Error, LocalFile, NewDocument, Query, Result,
};

use crate::merge;
use crate::state::Shared;
use crate::subscription::Subscription;

/// Snapshot of the document store.
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    /// Newest first.
    pub documents: Vec<Document>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Documents list with upload, edit and delete.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Backend,
    shared: Arc<Shared<DocumentState>>,
}

impl DocumentStore {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared::new(DocumentState::default())),
        }
    }

    pub fn snapshot(&self) -> DocumentState {
        self.shared.read(|s| s.clone())
    }

    pub fn documents(&self) -> Vec<Document> {
        self.shared.read(|s| s.documents.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<Document> {
        self.shared
            .read(|s| s.documents.iter().find(|d| d.id == id).cloned())
    }

    pub fn loading(&self) -> bool {
        self.shared.read(|s| s.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.read(|s| s.error.clone())
    }

    /// Ticks whenever the state changes.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.watch()
    }

    /// Documents matching a search and optional type/status filters.
    pub fn filtered(&self, filter: &DocumentFilter) -> Vec<Document> {
        self.shared.read(|s| filter.apply(&s.documents))
    }

    /// Replace the local list.
    pub fn set_documents(&self, documents: Vec<Document>) {
        self.shared.update(|s| s.documents = documents);
    }

    fn begin(&self, clear_error: bool) {
        self.shared.update(|s| {
            s.loading = true;
            if clear_error {
                s.error = None;
            }
        });
    }

    /// Clear `loading` and record the error, if any.
    fn finish<T>(&self, op: &str, result: Result<T>) -> Result<T> {
        self.shared.update(|s| {
            s.loading = false;
            if let Err(e) = &result {
                s.error = Some(e.message());
            }
        });
        if let Err(e) = &result {
            warn!(op, table = DOCUMENTS_TABLE, error = %e, "document store operation failed");
        }
        result
    }

    /// Load every document, newest first, replacing the local list.
    pub async fn fetch_all(&self) -> Result<Vec<Document>> {
        self.begin(true);
        let start = Instant::now();
        let result = async {
            let rows = self
                .backend
                .data
                .select(DOCUMENTS_TABLE, &Query::all().newest_first())
                .await?;
            decode_rows::<Document>(rows)
        }
        .await;
        if let Ok(documents) = &result {
            debug!(
                result_count = documents.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "fetched documents"
            );
            let documents = documents.clone();
            self.shared.update(|s| s.documents = documents);
        }
        self.finish("fetch_all", result)
    }

    /// Upload a file and create its document record.
    ///
    /// The blob goes to `documents/{millis}.{ext}` without overwrite; the new
    /// row carries the file name, path and public URL and is prepended locally.
    pub async fn upload(&self, file: &LocalFile, meta: NewDocument) -> Result<Document> {
        self.begin(true);
        let result = self.upload_inner(file, meta).await;
        if let Ok(document) = &result {
            let document = document.clone();
            self.shared
                .update(|s| merge::upsert_front(&mut s.documents, document));
        }
        self.finish("upload", result)
    }

    async fn upload_inner(&self, file: &LocalFile, meta: NewDocument) -> Result<Document> {
        let check = validate_file(&file.uri, &file.bytes, MAX_UPLOAD_BYTES);
        if !check.allowed {
            return Err(Error::InvalidInput(
                check.block_reason.unwrap_or_else(|| "File rejected".to_string()),
            ));
        }

        let now = Utc::now();
        let (file_name, file_path) = document_storage_path(&file.uri, now.timestamp_millis());
        let content_type = detect_content_type(&file.uri, &file.bytes, DOCUMENT_CONTENT_TYPE);

        self.backend
            .storage
            .upload(DOCUMENTS_BUCKET, &file_path, &file.bytes, &content_type, false)
            .await?;
        let file_url = self.backend.storage.public_url(DOCUMENTS_BUCKET, &file_path);
        info!(
            bucket = DOCUMENTS_BUCKET,
            storage_path = %file_path,
            size = file.bytes.len(),
            content_type = %content_type,
            "uploaded document file"
        );

        let mut row = serde_json::to_value(&meta)?;
        merge::shallow_merge(
            &mut row,
            &json!({
                "file_name": file_name,
                "file_path": file_path,
                "file_url": file_url,
                "created_at": now.to_rfc3339(),
            }),
        );

        let inserted = match self.backend.data.insert(DOCUMENTS_TABLE, row).await {
            Ok(inserted) => inserted,
            Err(e) => {
                // Do not leave an orphaned blob behind a failed insert.
                if let Err(cleanup) = self
                    .backend
                    .storage
                    .remove(DOCUMENTS_BUCKET, &[file_path.clone()])
                    .await
                {
                    warn!(storage_path = %file_path, error = %cleanup, "failed to remove orphaned blob");
                }
                return Err(e);
            }
        };
        let document: Document = serde_json::from_value(inserted)?;
        info!(record_id = %document.id, "created document");
        Ok(document)
    }

    /// Save a document's editable fields and merge the stored row locally.
    pub async fn update(&self, document: &Document) -> Result<Document> {
        self.update_fields(document.id, DocumentUpdate::from(document))
            .await
    }

    /// Save selected fields of a document.
    pub async fn update_fields(&self, id: Uuid, changes: DocumentUpdate) -> Result<Document> {
        if changes.is_empty() {
            return self
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("document {}", id)));
        }
        self.begin(false);
        let result = async {
            let changes = serde_json::to_value(&changes)?;
            let row = self.backend.data.update(DOCUMENTS_TABLE, id, changes).await?;
            let document: Document = serde_json::from_value(row)?;
            Ok::<_, Error>(document)
        }
        .await;
        if let Ok(document) = &result {
            let document = document.clone();
            self.shared
                .update(|s| merge::apply_replace(&mut s.documents, document));
            info!(record_id = %id, "updated document");
        }
        self.finish("update", result)
    }

    /// Delete a document and, when given, its stored file.
    ///
    /// A failed blob removal is logged and does not stop the row delete.
    pub async fn remove(&self, id: Uuid, file_path: Option<&str>) -> Result<()> {
        self.begin(false);
        if let Some(path) = file_path.filter(|p| !p.is_empty()) {
            if let Err(e) = self
                .backend
                .storage
                .remove(DOCUMENTS_BUCKET, &[path.to_string()])
                .await
            {
                warn!(bucket = DOCUMENTS_BUCKET, storage_path = path, error = %e, "failed to remove document file");
            }
        }
        let result = self.backend.data.delete(DOCUMENTS_TABLE, id).await;
        if result.is_ok() {
            self.shared
                .update(|s| merge::apply_delete(&mut s.documents, id));
            info!(record_id = %id, "deleted document");
        }
        self.finish("remove", result)
    }

    /// Merge one push event into the local list.
    pub fn apply_change(&self, event: &ChangeEvent) {
        match event.kind {
            ChangeKind::Insert => match event.new_record::<Document>() {
                Ok(Some(document)) => {
                    self.shared
                        .update(|s| merge::apply_insert(&mut s.documents, document));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping undecodable document insert"),
            },
            ChangeKind::Update => {
                let (Some(id), Some(patch)) = (event.new_id(), event.new.as_ref()) else {
                    return;
                };
                let result = self
                    .shared
                    .update(|s| merge::apply_update(&mut s.documents, id, patch));
                if let Err(e) = result {
                    warn!(record_id = %id, error = %e, "skipping undecodable document update");
                }
            }
            ChangeKind::Delete => {
                if let Some(id) = event.old_id() {
                    self.shared
                        .update(|s| merge::apply_delete(&mut s.documents, id));
                }
            }
        }
    }

    /// Follow live changes to the `documents` table.
    pub fn subscribe(&self) -> Subscription {
        let mut rx = self.backend.changes.subscribe(DOCUMENTS_TABLE);
        let store = self.clone();
        Subscription::spawn(&[DOCUMENTS_TABLE], async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(event_kind = %event.kind, "document change");
                        store.apply_change(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "document changes lagged, refetching");
                        let _ = store.fetch_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

