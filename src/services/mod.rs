//! The two relay pipelines and the streaming pump they share.

pub mod ingest_service;
pub mod relay;
pub mod retrieve_service;
