//! Process-local gateway keeping objects in memory.
//!
//! Meant for local development (`--backend memory`) and tests. It counts
//! every call so tests can assert which gateway paths a request touched.

use super::{ByteStream, ObjectStore, StoreError, StoreResult, TransferObserver, report_progress};
use crate::models::{
    object::{ObjectKey, ObjectStat, PutAck},
    range::ByteRange,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

/// Size of the chunks a ranged read is split into.
const DEFAULT_READ_CHUNK: usize = 64 * 1024;

struct StoredBlob {
    payload: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredBlob>>,
    read_chunk: usize,
    puts: AtomicUsize,
    stats: AtomicUsize,
    range_reads: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_read_chunk(DEFAULT_READ_CHUNK)
    }
}

impl MemoryStore {
    /// Store whose ranged reads yield chunks of at most `read_chunk` bytes.
    pub fn with_read_chunk(read_chunk: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            read_chunk: read_chunk.max(1),
            puts: AtomicUsize::new(0),
            stats: AtomicUsize::new(0),
            range_reads: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn stat_count(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn range_read_count(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let size_bytes = payload.len() as u64;
        let etag = format!("{:x}", md5::compute(&payload));

        let blob = StoredBlob {
            payload,
            content_type: content_type.to_string(),
            etag: etag.clone(),
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .await
            .insert(key.as_str().to_string(), blob);
        report_progress(progress, size_bytes, size_bytes);

        Ok(PutAck {
            key: key.to_string(),
            bucket: None,
            etag: Some(etag),
            version_id: None,
            location: None,
            size_bytes,
        })
    }

    async fn stat(&self, key: &ObjectKey) -> StoreResult<ObjectStat> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read().await;
        let blob = objects
            .get(key.as_str())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(ObjectStat {
            size_bytes: blob.payload.len() as u64,
            content_type: Some(blob.content_type.clone()),
            etag: Some(blob.etag.clone()),
            last_modified: Some(blob.last_modified),
        })
    }

    async fn get_range(&self, key: &ObjectKey, range: ByteRange) -> StoreResult<ByteStream> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let window = {
            let objects = self.objects.read().await;
            let blob = objects
                .get(key.as_str())
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let len = blob.payload.len() as u64;
            if range.start > range.end || range.end >= len {
                return Err(StoreError::backend(
                    "InvalidRange",
                    format!("range {}-{} outside object of {} bytes", range.start, range.end, len),
                ));
            }
            blob.payload
                .slice(range.start as usize..=range.end as usize)
        };

        let chunks: Vec<std::io::Result<Bytes>> = (0..window.len())
            .step_by(self.read_chunk)
            .map(|offset| {
                let end = (offset + self.read_chunk).min(window.len());
                Ok(window.slice(offset..end))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn ready(&self) -> StoreResult<()> {
        Ok(())
    }
}
