//! Represents an object (file) held by the object store gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Longest file extension carried over from an uploaded filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Opaque, globally unique name of a stored object.
///
/// Generated keys are a random v4 UUID followed by the extension of the
/// uploaded filename (`3f0c…e1.mp4`). Keys received on the retrieval path
/// are wrapped as-is; it is up to the gateway to reject unusable ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Generate a fresh key for an upload named `original_filename`.
    ///
    /// Only the extension of the filename survives, and only when it is
    /// plain ASCII alphanumerics; everything else about the client's
    /// filename is discarded.
    pub fn generate(original_filename: &str) -> Self {
        let id = Uuid::new_v4();
        match extension_of(original_filename) {
            Some(ext) => Self(format!("{}{}", id, ext)),
            None => Self(id.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extension of `filename` including the leading dot, e.g. `.mp4`.
///
/// Looks at the base name only (after the last `/` or `\`). A name whose
/// only dot is the first character (`.profile`) has no extension.
pub fn extension_of(filename: &str) -> Option<&str> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dot = base.rfind('.')?;
    if dot == 0 {
        return None;
    }
    let ext = &base[dot..];
    let body = &ext[1..];
    if body.is_empty()
        || body.len() > MAX_EXTENSION_LEN
        || !body.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext)
}

/// Metadata reported by the gateway for an existing object.
#[derive(Debug, Clone)]
pub struct ObjectStat {
    /// Size in bytes.
    pub size_bytes: u64,

    /// Content type recorded at ingestion.
    pub content_type: Option<String>,

    /// Store-specific entity tag.
    pub etag: Option<String>,

    pub last_modified: Option<DateTime<Utc>>,
}

/// Write acknowledgment returned by the gateway after a successful put.
#[derive(Debug, Clone, Serialize)]
pub struct PutAck {
    pub key: String,
    pub bucket: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub location: Option<String>,
    pub size_bytes: u64,
}
