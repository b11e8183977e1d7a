//! Ingestion pipeline: one uploaded file in, one durable object out.

use crate::{
    models::object::{ObjectKey, PutAck},
    store::{ObjectStore, TransferObserver},
};
use bytes::Bytes;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No file uploaded")]
    NoPayload,
    #[error("{message}")]
    StoreWriteFailed { message: String, code: String },
}

/// A single file received from a client. Lives for one ingestion call.
#[derive(Debug)]
pub struct UploadRequest {
    /// Client-side filename; only its extension is used.
    pub original_filename: String,
    pub content_type: String,
    pub payload: Bytes,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub key: ObjectKey,
    pub ack: PutAck,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn ObjectStore>,
}

impl IngestService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Store `request.payload` under a freshly generated key.
    ///
    /// Empty payloads are refused before the store is contacted. Store
    /// failures are returned as-is; nothing is retried.
    pub async fn ingest(&self, request: UploadRequest) -> Result<UploadReceipt, IngestError> {
        if request.payload.is_empty() {
            error!("No file uploaded");
            return Err(IngestError::NoPayload);
        }

        let key = ObjectKey::generate(&request.original_filename);
        let total = request.payload.len() as u64;
        info!(
            "ingesting {} ({} bytes, {}) via {}",
            key,
            total,
            request.content_type,
            self.store.name()
        );

        let progress = ProgressLog::new(key.clone());
        let ack = self
            .store
            .put(&key, request.payload, &request.content_type, Some(&progress))
            .await
            .map_err(|err| {
                error!("Upload error for {}: [{}] {}", key, err.code(), err);
                IngestError::StoreWriteFailed {
                    message: err.to_string(),
                    code: err.code().to_string(),
                }
            })?;

        info!("stored {} ({} bytes)", key, ack.size_bytes);
        Ok(UploadReceipt { key, ack })
    }
}

/// Logs upload progress as a percentage, at most once per percent step.
struct ProgressLog {
    key: ObjectKey,
    last_percent: AtomicU64,
}

impl ProgressLog {
    fn new(key: ObjectKey) -> Self {
        Self {
            key,
            last_percent: AtomicU64::new(u64::MAX),
        }
    }
}

impl TransferObserver for ProgressLog {
    fn on_progress(&self, transferred: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (transferred.saturating_mul(100) + total / 2) / total;
        if self.last_percent.swap(percent, Ordering::Relaxed) != percent {
            info!("Uploaded {} bytes ({}%) of {}", transferred, percent, self.key);
        }
    }
}
