//! Range retrieval pipeline.
//!
//! Turns `(key, Range header)` into a window of a stored object and a
//! bounded stream of its bytes. Every retrieval is independent: the only
//! thing shared between requests is the gateway handle.

use super::relay::relay;
use crate::{
    models::{
        object::{ObjectKey, ObjectStat},
        range::ByteRange,
    },
    store::{ByteStream, ObjectStore},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("{message}")]
    NotFound { message: String, code: String },
    #[error("Range not satisfiable")]
    RangeRequired,
    #[error("Range not satisfiable")]
    RangeNotSatisfiable { size: u64 },
}

/// An open partial-content transfer, ready to be framed as a 206 response.
pub struct PartialContent {
    pub range: ByteRange,
    /// Total size of the object.
    pub size: u64,
    pub content_type: String,
    pub stat: ObjectStat,
    pub body: ByteStream,
}

impl PartialContent {
    pub fn content_length(&self) -> u64 {
        self.range.len()
    }

    pub fn content_range(&self) -> String {
        self.range.content_range(self.size)
    }
}

#[derive(Clone)]
pub struct RetrieveService {
    store: Arc<dyn ObjectStore>,
    playback_content_type: Arc<str>,
    relay_buffer: usize,
}

impl RetrieveService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        playback_content_type: impl Into<Arc<str>>,
        relay_buffer: usize,
    ) -> Self {
        Self {
            store,
            playback_content_type: playback_content_type.into(),
            relay_buffer,
        }
    }

    /// Open the window of `key` selected by `range_header`.
    ///
    /// A missing header fails before the store is contacted; the relay
    /// never serves whole objects.
    pub async fn retrieve(
        &self,
        key: &ObjectKey,
        range_header: Option<&str>,
    ) -> Result<PartialContent, RetrieveError> {
        let Some(range_header) = range_header else {
            debug!("rejecting {}: no Range header", key);
            return Err(RetrieveError::RangeRequired);
        };

        let stat = self.store.stat(key).await.map_err(|err| {
            error!("HeadObject error for {}: [{}] {}", key, err.code(), err);
            RetrieveError::NotFound {
                message: err.to_string(),
                code: err.code().to_string(),
            }
        })?;
        let size = stat.size_bytes;
        debug!(
            "metadata for {}: {} bytes, stored as {}",
            key,
            size,
            stat.content_type.as_deref().unwrap_or("unknown")
        );

        let range = ByteRange::parse(range_header, size).map_err(|reason| {
            debug!("unsatisfiable range `{}` for {} ({}): {}", range_header, key, size, reason);
            RetrieveError::RangeNotSatisfiable { size }
        })?;
        debug!("range for {}: {}", key, range.content_range(size));

        let upstream = self.store.get_range(key, range).await.map_err(|err| {
            error!("GetObject error for {}: [{}] {}", key, err.code(), err);
            RetrieveError::NotFound {
                message: err.to_string(),
                code: err.code().to_string(),
            }
        })?;
        debug!("store stream open for {}", key);

        let label = format!("{} [{}]", key, range.content_range(size));
        Ok(PartialContent {
            range,
            size,
            content_type: self.playback_content_type.to_string(),
            stat,
            body: relay(upstream, self.relay_buffer, label),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_store::MemoryStore;
    use bytes::Bytes;
    use futures::TryStreamExt;

    async fn service_with(payload: &'static [u8]) -> (Arc<MemoryStore>, RetrieveService, ObjectKey) {
        let store = Arc::new(MemoryStore::with_read_chunk(3));
        let key = ObjectKey::generate("clip.mp4");
        store
            .put(&key, Bytes::from_static(payload), "video/mp4", None)
            .await
            .unwrap();
        let service = RetrieveService::new(store.clone(), "video/mp4", 4);
        (store, service, key)
    }

    async fn body_of(content: PartialContent) -> Vec<u8> {
        let chunks: Vec<Bytes> = content.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn closed_range_returns_the_slice() {
        let (_, service, key) = service_with(b"0123456789").await;

        let content = service.retrieve(&key, Some("bytes=2-5")).await.unwrap();
        assert_eq!(content.content_range(), "bytes 2-5/10");
        assert_eq!(content.content_length(), 4);
        assert_eq!(content.content_type, "video/mp4");
        assert_eq!(body_of(content).await, b"2345");
    }

    #[tokio::test]
    async fn open_range_runs_to_the_end() {
        let (_, service, key) = service_with(b"0123456789").await;

        let content = service.retrieve(&key, Some("bytes=5-")).await.unwrap();
        assert_eq!(content.content_range(), "bytes 5-9/10");
        assert_eq!(content.content_length(), 5);
        assert_eq!(body_of(content).await, b"56789");
    }

    #[tokio::test]
    async fn full_range_round_trips_payload() {
        let (_, service, key) = service_with(b"0123456789").await;

        let content = service.retrieve(&key, Some("bytes=0-")).await.unwrap();
        assert_eq!(body_of(content).await, b"0123456789");
    }

    #[tokio::test]
    async fn every_window_matches_the_payload() {
        let payload: &'static [u8] = b"the quick brown fox";
        let (_, service, key) = service_with(payload).await;
        let size = payload.len();

        for start in 0..size {
            for end in start..size {
                let header = format!("bytes={}-{}", start, end);
                let content = service.retrieve(&key, Some(&header)).await.unwrap();
                assert_eq!(content.content_length() as usize, end - start + 1);
                assert_eq!(body_of(content).await, &payload[start..=end]);
            }
        }
    }

    #[tokio::test]
    async fn missing_range_header_touches_nothing() {
        let (store, service, key) = service_with(b"0123456789").await;

        let err = service.retrieve(&key, None).await.err().unwrap();
        assert!(matches!(err, RetrieveError::RangeRequired));
        assert_eq!(store.stat_count(), 0);
        assert_eq!(store.range_read_count(), 0);
    }

    #[tokio::test]
    async fn unknown_key_reports_store_error() {
        let (store, service, _) = service_with(b"0123456789").await;
        let missing = ObjectKey::from("missing.mp4".to_string());

        match service.retrieve(&missing, Some("bytes=0-1")).await {
            Err(RetrieveError::NotFound { message, code }) => {
                assert_eq!(code, "NotFound");
                assert!(message.contains("missing.mp4"));
            }
            _ => panic!("expected NotFound"),
        }
        assert_eq!(store.range_read_count(), 0);
    }

    #[tokio::test]
    async fn start_past_end_is_not_satisfiable() {
        let (store, service, key) = service_with(b"0123456789").await;

        let err = service.retrieve(&key, Some("bytes=10-")).await.err().unwrap();
        assert!(matches!(err, RetrieveError::RangeNotSatisfiable { size: 10 }));
        assert_eq!(store.range_read_count(), 0);
    }

    #[tokio::test]
    async fn end_past_object_is_clamped() {
        let (_, service, key) = service_with(b"0123456789").await;

        let content = service.retrieve(&key, Some("bytes=7-99")).await.unwrap();
        assert_eq!(content.content_range(), "bytes 7-9/10");
        assert_eq!(body_of(content).await, b"789");
    }

    #[tokio::test]
    async fn concurrent_disjoint_ranges_stay_isolated() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let store = Arc::new(MemoryStore::with_read_chunk(7));
        let key = ObjectKey::generate("big.mp4");
        store
            .put(&key, Bytes::from(payload.clone()), "video/mp4", None)
            .await
            .unwrap();
        let service = RetrieveService::new(store, "video/mp4", 2);

        let mut tasks = Vec::new();
        for window in 0..16usize {
            let service = service.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let (start, end) = (window * 256, window * 256 + 255);
                let header = format!("bytes={}-{}", start, end);
                let content = service.retrieve(&key, Some(&header)).await.unwrap();
                (start, end, body_of(content).await)
            }));
        }

        for task in tasks {
            let (start, end, body) = task.await.unwrap();
            assert_eq!(body, &payload[start..=end]);
        }
    }
}
