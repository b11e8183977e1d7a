use crate::services::{ingest_service::IngestError, retrieve_service::RetrieveError};
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
///
/// Renders as JSON `{message, code}` by default, or as a bare text body
/// for the plain-text responses (403, 416).
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<String>,
    pub plain_text: bool,
    pub headers: HeaderMap,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            code: None,
            plain_text: false,
            headers: HeaderMap::new(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 500 carrying the store's own error code
    pub fn store(msg: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg).with_code(code)
    }

    /// Plain-text response body instead of JSON.
    pub fn plain(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            plain_text: true,
            ..Self::new(status, msg)
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = if self.plain_text {
            (self.status, self.message).into_response()
        } else {
            let body = ErrorBody {
                message: &self.message,
                code: self.code.as_deref(),
            };
            (self.status, Json(body)).into_response()
        };
        response.headers_mut().extend(self.headers);
        response
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoPayload => AppError::bad_request(err.to_string()),
            IngestError::StoreWriteFailed { message, code } => AppError::store(message, code),
        }
    }
}

impl From<RetrieveError> for AppError {
    fn from(err: RetrieveError) -> Self {
        match err {
            RetrieveError::NotFound { message, code } => AppError::store(message, code),
            RetrieveError::RangeRequired => {
                AppError::plain(StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
            }
            RetrieveError::RangeNotSatisfiable { size } => {
                let unsatisfied = HeaderValue::from_str(&format!("bytes */{}", size))
                    .unwrap_or_else(|_| HeaderValue::from_static("bytes */*"));
                AppError::plain(StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
                    .with_header(header::CONTENT_RANGE, unsatisfied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn store_errors_render_message_and_code() {
        let response = AppError::from(RetrieveError::NotFound {
            message: "object `k` not found".into(),
            code: "NotFound".into(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["message"], "object `k` not found");
        assert_eq!(body["code"], "NotFound");
    }

    #[tokio::test]
    async fn no_payload_has_no_code() {
        let response = AppError::from(IngestError::NoPayload).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "No file uploaded" }));
    }

    #[tokio::test]
    async fn unsatisfiable_range_is_plain_text_with_size() {
        let response = AppError::from(RetrieveError::RangeNotSatisfiable { size: 10 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert_eq!(body_text(response).await, "Range not satisfiable");
    }
}
