//! Object store gateway.
//!
//! Both pipelines talk to durable storage exclusively through the
//! [`ObjectStore`] trait: a whole-object write, a metadata query and a
//! ranged read. One gateway instance is built at startup and shared by
//! every request as an `Arc<dyn ObjectStore>`.

pub mod fs_store;
pub mod memory_store;
pub mod s3_store;

use crate::models::{
    object::{ObjectKey, ObjectStat, PutAck},
    range::ByteRange,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{io, pin::Pin};
use thiserror::Error;

/// Stream of object bytes, in store order.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("{message}")]
    Backend { code: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable, store-provided error code passed through to callers.
    pub fn code(&self) -> &str {
        match self {
            StoreError::NotFound(_) => "NotFound",
            StoreError::InvalidKey => "InvalidKey",
            StoreError::Backend { code, .. } => code,
            StoreError::Io(_) => "IoError",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Observer for write progress. Purely advisory.
pub trait TransferObserver: Send + Sync {
    /// Called with the cumulative number of bytes written so far.
    fn on_progress(&self, transferred: u64, total: u64);
}

pub(crate) fn report_progress(
    observer: Option<&dyn TransferObserver>,
    transferred: u64,
    total: u64,
) {
    if let Some(observer) = observer {
        observer.on_progress(transferred, total);
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name used in logs and readiness output.
    fn name(&self) -> &'static str;

    /// Store `payload` under `key`. The object must not become visible to
    /// readers unless the whole write succeeded.
    async fn put(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck>;

    /// Metadata of an existing object.
    async fn stat(&self, key: &ObjectKey) -> StoreResult<ObjectStat>;

    /// Open a read of the inclusive window `range`.
    async fn get_range(&self, key: &ObjectKey, range: ByteRange) -> StoreResult<ByteStream>;

    /// Cheap reachability probe for readiness checks.
    async fn ready(&self) -> StoreResult<()>;
}
