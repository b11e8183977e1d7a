//! S3-compatible gateway built on the AWS SDK.
//!
//! Addresses a single bucket with path-style URLs so it works against
//! MinIO/RustFS style endpoints as well as AWS. Payloads larger than one
//! part go through a multipart upload, which S3 only makes visible once it
//! is completed; any failure aborts the upload.

use super::{ByteStream, ObjectStore, StoreError, StoreResult, TransferObserver, report_progress};
use crate::{
    config::S3Settings,
    models::{
        object::{ObjectKey, ObjectStat, PutAck},
        range::ByteRange,
    },
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream as AwsByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::DateTime;
use std::io;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    part_size: usize,
}

impl S3Store {
    /// Build the shared SDK client from relay settings.
    ///
    /// Explicit credentials win; without them the SDK's default provider
    /// chain is used.
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "media-relay",
            ));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(true)
                .build(),
        );

        Self {
            client,
            bucket: settings.bucket.clone(),
            part_size: settings.part_size,
        }
    }

    async fn put_single(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        let total = payload.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(content_type)
            .content_length(total as i64)
            .content_md5(content_md5(&payload))
            .body(AwsByteStream::from(payload))
            .send()
            .await
            .map_err(backend_error)?;
        report_progress(progress, total, total);

        Ok(PutAck {
            key: key.to_string(),
            bucket: Some(self.bucket.clone()),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            location: None,
            size_bytes: total,
        })
    }

    async fn put_multipart(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(content_type)
            .send()
            .await
            .map_err(backend_error)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::backend("MissingUploadId", "store returned no upload id"))?
            .to_string();

        match self.upload_parts(key, &upload_id, payload, progress).await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key.as_str())
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "failed to abort multipart upload {} for {}: {}",
                        upload_id,
                        key,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        payload: Bytes,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        let total = payload.len() as u64;
        let mut parts = Vec::new();
        let mut sent: u64 = 0;

        for (index, offset) in (0..payload.len()).step_by(self.part_size).enumerate() {
            let end = (offset + self.part_size).min(payload.len());
            let chunk = payload.slice(offset..end);
            let part_number = index as i32 + 1;
            let chunk_len = chunk.len() as u64;

            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key.as_str())
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(chunk_len as i64)
                .content_md5(content_md5(&chunk))
                .body(AwsByteStream::from(chunk))
                .send()
                .await
                .map_err(backend_error)?;

            sent += chunk_len;
            report_progress(progress, sent, total);
            debug!("uploaded part {} of {} ({} bytes)", part_number, key, chunk_len);
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .build(),
            );
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(backend_error)?;

        Ok(PutAck {
            key: key.to_string(),
            bucket: Some(self.bucket.clone()),
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            location: output.location().map(str::to_string),
            size_bytes: total,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        key: &ObjectKey,
        payload: Bytes,
        content_type: &str,
        progress: Option<&dyn TransferObserver>,
    ) -> StoreResult<PutAck> {
        if payload.len() > self.part_size {
            self.put_multipart(key, payload, content_type, progress).await
        } else {
            self.put_single(key, payload, content_type, progress).await
        }
    }

    async fn stat(&self, key: &ObjectKey) -> StoreResult<ObjectStat> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    StoreError::NotFound(key.to_string())
                } else {
                    backend_error(err)
                }
            })?;

        let size_bytes = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| StoreError::backend("MissingContentLength", "store reported no size"))?;

        Ok(ObjectStat {
            size_bytes,
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            last_modified: output
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        })
    }

    async fn get_range(&self, key: &ObjectKey, range: ByteRange) -> StoreResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .range(range.header_value())
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::NotFound(key.to_string())
                } else {
                    backend_error(err)
                }
            })?;

        let stream = futures::stream::unfold(output.body, |mut body| async move {
            let chunk = body.next().await?;
            Some((chunk.map_err(io::Error::other), body))
        });
        Ok(Box::pin(stream))
    }

    async fn ready(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

/// Base64 MD5 digest for the `Content-MD5` integrity header.
fn content_md5(payload: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(payload).0)
}

/// Map an SDK failure to a store error, keeping the service's own code and
/// message when it sent one.
fn backend_error<E>(err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = match (&err, err.code()) {
        (_, Some(code)) => code.to_string(),
        (SdkError::TimeoutError(_), None) => "TimeoutError".to_string(),
        (SdkError::DispatchFailure(_), None) => "DispatchFailure".to_string(),
        (_, None) => "Unknown".to_string(),
    };
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    StoreError::Backend { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_md5_is_base64_digest() {
        assert_eq!(content_md5(b"0123456789"), "eB5eJF1ptWaXm4bijSPyxw==");
    }

    #[test]
    fn store_error_keeps_backend_code() {
        let err = StoreError::backend("AccessDenied", "Access Denied");
        assert_eq!(err.code(), "AccessDenied");
        assert_eq!(err.to_string(), "Access Denied");
    }
}
