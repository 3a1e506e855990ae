//! Durable storage for generated certificates
//!
//! Certificates live at `certificates/{classId}/{redemptionId}.pdf`. Writing
//! the same pair again replaces the object. Readers get a signed URL that
//! expires after seven days.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use ceu_common::ArtifactRef;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const CACHE_CONTROL: &str = "public, max-age=3600";

/// Lifetime of retrieval URLs
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAX_SEGMENT_LENGTH: usize = 255;

/// Artifact store errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Object store upload failed: {0}")]
    Upload(String),

    #[error("Failed to sign retrieval URL: {0}")]
    Signing(String),
}

/// Store for generated certificate documents
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a certificate and return its path and a signed retrieval URL
    async fn put_certificate(
        &self,
        class_id: &str,
        redemption_id: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactRef, ArtifactError>;
}

/// Deterministic store path for a certificate
pub fn certificate_path(class_id: &str, redemption_id: &str) -> Result<String, ArtifactError> {
    validate_segment(class_id)?;
    validate_segment(redemption_id)?;
    Ok(format!("certificates/{class_id}/{redemption_id}.pdf"))
}

fn validate_segment(segment: &str) -> Result<(), ArtifactError> {
    if segment.is_empty() {
        return Err(ArtifactError::InvalidKey("empty segment".to_string()));
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(ArtifactError::InvalidKey(format!(
            "segment longer than {MAX_SEGMENT_LENGTH} bytes"
        )));
    }
    if segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(ArtifactError::InvalidKey(format!(
            "segment not allowed: {segment}"
        )));
    }
    Ok(())
}

/// S3 connection settings
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// Artifact store on an S3-compatible bucket
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    /// Build a client from the ambient AWS configuration plus overrides
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = config.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }

        info!("Using certificate bucket {}", config.bucket);

        Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_certificate(
        &self,
        class_id: &str,
        redemption_id: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactRef, ArtifactError> {
        let path = certificate_path(class_id, redemption_id)?;
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&path)
            .body(ByteStream::from(bytes))
            .content_type(PDF_CONTENT_TYPE)
            .cache_control(CACHE_CONTROL)
            .send()
            .await
            .map_err(|e| ArtifactError::Upload(e.to_string()))?;

        debug!(path = %path, size, "Uploaded certificate");

        let presigning = PresigningConfig::expires_in(SIGNED_URL_TTL)
            .map_err(|e| ArtifactError::Signing(e.to_string()))?;
        let signed = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&path)
            .presigned(presigning)
            .await
            .map_err(|e| ArtifactError::Signing(e.to_string()))?;

        Ok(ArtifactRef {
            path,
            url: signed.uri().to_string(),
        })
    }
}

/// A stored object and its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: String,
}

/// Artifact store held in memory, for mock mode and tests
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put_certificate(
        &self,
        class_id: &str,
        redemption_id: &str,
        bytes: Vec<u8>,
    ) -> Result<ArtifactRef, ArtifactError> {
        let path = certificate_path(class_id, redemption_id)?;
        self.objects.lock().await.insert(
            path.clone(),
            StoredObject {
                bytes,
                content_type: PDF_CONTENT_TYPE.to_string(),
                cache_control: CACHE_CONTROL.to_string(),
            },
        );

        let url = format!(
            "memory://{path}?expires_in={}",
            SIGNED_URL_TTL.as_secs()
        );
        Ok(ArtifactRef { path, url })
    }
}
