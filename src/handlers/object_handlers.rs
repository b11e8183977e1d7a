//! HTTP handlers for the upload and ranged video endpoints.
//! Ranged bodies are streamed straight from the relay pump; nothing is
//! buffered beyond the relay's bounded channel.

use crate::{
    errors::AppError,
    models::object::{ObjectKey, PutAck},
    services::{
        ingest_service::{IngestError, IngestService, UploadRequest},
        retrieve_service::{PartialContent, RetrieveService},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Name of the multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";
const DEFAULT_UPLOAD_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub data: PutAck,
    pub key: String,
}

/// `POST /upload`: store the multipart `file` field as a new object.
pub async fn upload_object(
    State(ingest): State<IngestService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_UPLOAD_TYPE)
            .to_string();
        let payload = field
            .bytes()
            .await
            .map_err(|err| AppError::new(err.status(), err.body_text()))?;

        upload = Some(UploadRequest {
            original_filename,
            content_type,
            payload,
        });
        break;
    }

    let Some(upload) = upload else {
        error!("No file uploaded");
        return Err(IngestError::NoPayload.into());
    };

    let receipt = ingest.ingest(upload).await?;
    Ok(Json(UploadResponse {
        message: "Upload successful",
        data: receipt.ack,
        key: receipt.key.to_string(),
    }))
}

/// `GET /video/{key}`: stream the window selected by the `Range` header.
pub async fn stream_video(
    State(retrieve): State<RetrieveService>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    // A header that is not visible ASCII is treated as present but unusable.
    let range = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default());

    let content = retrieve.retrieve(&ObjectKey::from(key), range).await?;
    Ok(partial_content_response(content))
}

fn partial_content_response(content: PartialContent) -> Response {
    let mut headers = HeaderMap::new();
    set_partial_content_headers(&mut headers, &content);

    let mut response = Response::new(Body::from_stream(content.body));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    *response.headers_mut() = headers;
    response
}

fn set_partial_content_headers(headers: &mut HeaderMap, content: &PartialContent) {
    if let Ok(value) = HeaderValue::from_str(&content.content_range()) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content.content_length()));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("video/mp4")),
    );

    if let Some(etag) = content.stat.etag.as_ref() {
        let quoted = if etag.starts_with('"') {
            etag.clone()
        } else {
            format!("\"{}\"", etag)
        };
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Some(modified) = content.stat.last_modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
