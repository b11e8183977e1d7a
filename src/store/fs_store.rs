//! src/store/fs_store.rs
//!
//! FsStore: gateway backed by a local directory. Payloads are sharded
//! beneath `base_path/{shard}/{shard}/{key}`; each object has a small JSON
//! sidecar (`.meta-{key}`) next to it recording content type and etag.
//! Writes go to a temporary file which is fsynced and renamed into place,
//! so a reader never observes a partially written object.

use super::{ByteStream, ObjectStore, StoreError, StoreResult, TransferObserver, report_progress};
use crate::models::{
    object::{ObjectKey, ObjectStat, PutAck},
    range::ByteRange,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Context;
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
/// Granularity of disk writes and progress reports.
const WRITE_CHUNK: usize = 256 * 1024;
const READ_BUFFER: usize = 64 * 1024;

/// Contents of the per-object sidecar file.
#[derive(Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    etag: String,
}

#[derive(Clone, Debug)]
pub struct FsStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `base_path`, creating the directory if needed.
    pub async fn open(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        if fs::metadata(&base_path).await.is_err() {
            fs::create_dir_all(&base_path).await?;
            tracing::info!("Created storage directory at {}", base_path.display());
        }
        Ok(Self { base_path })
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that are empty, hidden (leading `.`), contain a path
    /// separator or `..`, or carry control characters.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidKey);
        }
        if key.starts_with('.') || key.contains("..") {
            return Err(StoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return Err(StoreError::InvalidKey);
        }
        Ok(())
    }

    /// Two-level shard identifiers for a key: the first two bytes of
    /// MD5(key) as lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.shard_dir(key).join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.shard_dir(key).join(format!(".meta-{}", key))
    }

    async fn read_sidecar(&self, key: &str) -> Option<Sidecar> {
        let raw = fs::read(self.sidecar_path(key)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Write `payload` into `tmp_path`, returning the hex MD5 of the bytes.
    async fn write_payload(
        tmp_path: &Path,
        payload: &Bytes,
        progress: Option<&dyn TransferObserver>,
    ) -> io::Result<String> {
        let total = payload.len() as u64;
        let mut file = File::create(tmp_path).await?;
        let mut digest = Context::new();
        let mut written: u64 = 0;
        for chunk in payload.chunks(WRITE_CHUNK) {
            digest.consume(chunk);
            file.write_all(chunk).await?;
            written += chunk.len() as u64;
            report_progress(progress, written, total);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(format!("{:x}", digest.compute()))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn put(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        Self::ensure_key_safe(key.as_str())?;
        let parent = self.shard_dir(key.as_str());
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let etag = match Self::write_payload(&tmp_path, &payload, progress).await {
            Ok(etag) => etag,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        };

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            etag: etag.clone(),
        };
        let sidecar_json = serde_json::to_vec(&sidecar).map_err(io::Error::other)?;
        if let Err(err) = fs::write(self.sidecar_path(key.as_str()), sidecar_json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let file_path = self.object_path(key.as_str());
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = fs::remove_file(self.sidecar_path(key.as_str())).await;
            return Err(StoreError::Io(err));
        }
        debug!("stored {} at {}", key, file_path.display());

        Ok(PutAck {
            key: key.to_string(),
            bucket: None,
            etag: Some(etag),
            version_id: None,
            location: Some(file_path.display().to_string()),
            size_bytes: payload.len() as u64,
        })
    }

    async fn stat(&self, key: &ObjectKey) -> StoreResult<ObjectStat> {
        Self::ensure_key_safe(key.as_str())?;
        let meta = fs::metadata(self.object_path(key.as_str()))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
                _ => StoreError::Io(err),
            })?;
        let sidecar = self.read_sidecar(key.as_str()).await;

        Ok(ObjectStat {
            size_bytes: meta.len(),
            content_type: sidecar.as_ref().map(|s| s.content_type.clone()),
            etag: sidecar.map(|s| s.etag),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn get_range(&self, key: &ObjectKey, range: ByteRange) -> StoreResult<ByteStream> {
        Self::ensure_key_safe(key.as_str())?;
        let mut file = File::open(self.object_path(key.as_str()))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
                _ => StoreError::Io(err),
            })?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let reader = file.take(range.len());
        Ok(Box::pin(ReaderStream::with_capacity(reader, READ_BUFFER)))
    }

    /// Best-effort write/read/delete of a scratch file under `base_path`.
    async fn ready(&self) -> StoreResult<()> {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(StoreError::backend("DiskMismatch", "file content mismatch"));
        }
        Ok(())
    }
}
