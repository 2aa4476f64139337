//! Multipart upload to the ingest endpoint

use super::integrity::{chunk_payload, ChunkRecord, IntegritySigner};
use super::media::{check_media_integrity, MediaFile, MediaProbe};
use super::TransportError;
use crate::config::TransportConfig;
use crate::device::DeviceBindingRecord;
use crate::session::Challenge;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Everything sent for one session
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub session_id: Uuid,
    pub challenge: Challenge,
    pub media: Vec<MediaFile>,
    pub device_binding: Option<DeviceBindingRecord>,
}

/// Successful response, body kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
}

/// Fields the ingest server is known to return
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct IngestResponse {
    pub token: Option<String>,
    pub session_id: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
}

impl UploadReceipt {
    /// Parse the body as an ingest response, if it is one
    pub fn ingest(&self) -> Option<IngestResponse> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Upload seam used by the capture controller
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, TransportError>;
}

/// One media file after sanity check, signing and re-verification
#[derive(Debug, Clone)]
struct PreparedMedia {
    file: MediaFile,
    record: ChunkRecord,
}

/// HTTPS client that signs media and posts it as one multipart body
pub struct SecureTransport {
    http: reqwest::Client,
    config: TransportConfig,
    signer: IntegritySigner,
    probe: Arc<dyn MediaProbe>,
}

impl SecureTransport {
    pub fn new(config: TransportConfig, probe: Arc<dyn MediaProbe>) -> Result<Self, TransportError> {
        if config.require_https && !config.endpoint.starts_with("https://") {
            return Err(TransportError::InsecureEndpoint(config.endpoint.clone()));
        }

        let http = reqwest::Client::builder()
            .https_only(config.require_https)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(config.request_timeout())
            .user_agent(format!("crabkyc/{}", crate::VERSION))
            .build()?;
        let signer = IntegritySigner::new(config.hmac_secret.as_bytes())?;

        Ok(Self {
            http,
            config,
            signer,
            probe,
        })
    }

    pub fn signer(&self) -> &IntegritySigner {
        &self.signer
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sanity-check, read and sign every file, then re-verify each
    /// signature. Fails on the first bad file; nothing is sent.
    async fn prepare(&self, media: &[MediaFile]) -> Result<Vec<PreparedMedia>, TransportError> {
        if media.is_empty() {
            return Err(TransportError::EmptyUpload);
        }

        // Sanity first so a bad second file never costs a read of the first
        for file in media {
            if let Err(e) = check_media_integrity(self.probe.as_ref(), file, &self.config) {
                log::warn!("Upload aborted before network: {}", e);
                return Err(e.into());
            }
        }

        let mut prepared = Vec::with_capacity(media.len());
        for (index, file) in media.iter().enumerate() {
            let data = tokio::fs::read(&file.path)
                .await
                .map_err(|source| TransportError::Io {
                    path: file.path.clone(),
                    source,
                })?;
            let record = self.signer.process_chunk(index, Bytes::from(data));
            if !self.signer.verify_chunk(&record).passed() {
                log::error!("Integrity mismatch on {} media", file.kind);
                return Err(TransportError::IntegrityMismatch {
                    unit: file.kind.to_string(),
                });
            }
            prepared.push(PreparedMedia {
                file: file.clone(),
                record,
            });
        }
        Ok(prepared)
    }

    /// Upload whole media files with their digests as sibling fields
    pub async fn upload_media(&self, request: &UploadRequest) -> Result<UploadReceipt, TransportError> {
        let prepared = self.prepare(&request.media).await?;

        let mut form = Form::new()
            .text("session_id", request.session_id.to_string())
            .text("challenge", request.challenge.as_str());
        if let Some(binding) = &request.device_binding {
            form = form.text("device_binding", serde_json::to_string(binding)?);
        }

        for item in prepared {
            let kind = item.file.kind;
            let size = item.record.payload.len();
            let part = Part::stream_with_length(item.record.payload, size as u64)
                .file_name(kind.file_name())
                .mime_str("video/mp4")?;
            form = form
                .part(kind.field_name(), part)
                .text(kind.hmac_field(), item.record.hmac)
                .text(kind.sha256_field(), item.record.sha256);
            log::debug!("Attached {} media ({} bytes)", kind, size);
        }

        self.send(form).await
    }

    /// Upload one payload split into chunks. Every chunk is verified
    /// before any of them is attached.
    pub async fn upload_chunks(
        &self,
        session_id: Uuid,
        data: Bytes,
    ) -> Result<UploadReceipt, TransportError> {
        let records: Vec<ChunkRecord> = chunk_payload(data, self.config.chunk_size)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| self.signer.process_chunk(i, chunk))
            .collect();
        if records.is_empty() {
            return Err(TransportError::EmptyUpload);
        }
        self.signer.verify_all(&records)?;

        let mut form = Form::new()
            .text("session_id", session_id.to_string())
            .text("chunk_count", records.len().to_string());
        for record in records {
            let i = record.index;
            let size = record.payload.len() as u64;
            form = form
                .part(
                    format!("chunk_{i}"),
                    Part::stream_with_length(record.payload, size).file_name(format!("chunk_{i}")),
                )
                .text(format!("hmac_{i}"), record.hmac)
                .text(format!("sha256_{i}"), record.sha256);
        }

        self.send(form).await
    }

    async fn send(&self, form: Form) -> Result<UploadReceipt, TransportError> {
        log::info!("Uploading to {}", self.config.endpoint);
        let response = self.http.post(&self.config.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            log::info!("Upload accepted with status {}", status.as_u16());
            Ok(UploadReceipt {
                status: status.as_u16(),
                body,
            })
        } else {
            log::warn!("Upload rejected with status {}", status.as_u16());
            Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl MediaUploader for SecureTransport {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, TransportError> {
        self.upload_media(&request).await
    }
}

impl std::fmt::Debug for SecureTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Mp4Probe;

    fn config(endpoint: &str, require_https: bool) -> TransportConfig {
        TransportConfig {
            endpoint: endpoint.to_string(),
            require_https,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_plain_http_refused_when_https_required() {
        let err = SecureTransport::new(config("http://ingest.local/upload", true), Arc::new(Mp4Probe))
            .unwrap_err();
        assert!(matches!(err, TransportError::InsecureEndpoint(_)));
        assert!(err.is_pre_network());
    }

    #[test]
    fn test_receipt_ingest_parsing() {
        let receipt = UploadReceipt {
            status: 200,
            body: r#"{"token":"abc","session_id":"s-1","status":"received"}"#.to_string(),
        };
        let ingest = receipt.ingest().unwrap();
        assert_eq!(ingest.token.as_deref(), Some("abc"));
        assert_eq!(ingest.message, None);

        let opaque = UploadReceipt {
            status: 200,
            body: "ok".to_string(),
        };
        assert!(opaque.ingest().is_none());
    }

    #[tokio::test]
    async fn test_empty_media_list_rejected() {
        let transport =
            SecureTransport::new(config("http://127.0.0.1:9/upload", false), Arc::new(Mp4Probe))
                .unwrap();
        let request = UploadRequest {
            session_id: Uuid::new_v4(),
            challenge: Challenge::Blink,
            media: Vec::new(),
            device_binding: None,
        };
        assert!(matches!(
            transport.upload(request).await,
            Err(TransportError::EmptyUpload)
        ));
    }
}
