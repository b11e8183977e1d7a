//! Shared application state handed to every handler.

use crate::{
    services::{ingest_service::IngestService, retrieve_service::RetrieveService},
    store::ObjectStore,
};
use axum::extract::FromRef;
use std::sync::Arc;

/// Referer prefix a request must carry to be admitted.
#[derive(Clone, Debug)]
pub struct AccessPolicy {
    pub allowed_referrer: Arc<str>,
}

impl AccessPolicy {
    pub fn new(allowed_referrer: impl Into<Arc<str>>) -> Self {
        Self {
            allowed_referrer: allowed_referrer.into(),
        }
    }

    pub fn admits(&self, referrer: Option<&str>) -> bool {
        referrer.is_some_and(|r| r.starts_with(&*self.allowed_referrer))
    }
}

#[derive(Clone, FromRef)]
pub struct AppState {
    pub ingest: IngestService,
    pub retrieve: RetrieveService,
    pub store: Arc<dyn ObjectStore>,
    pub access: AccessPolicy,
    /// Largest accepted request body on the upload route.
    #[from_ref(skip)]
    pub upload_limit: usize,
}

impl AppState {
    /// Wire both pipelines to the one gateway handle.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        access: AccessPolicy,
        playback_content_type: &str,
        relay_buffer: usize,
        upload_limit: usize,
    ) -> Self {
        Self {
            ingest: IngestService::new(store.clone()),
            retrieve: RetrieveService::new(store.clone(), playback_content_type, relay_buffer),
            store,
            access,
            upload_limit,
        }
    }
}
