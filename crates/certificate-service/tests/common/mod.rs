//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use certificate_service::artifact_store::{ArtifactError, ArtifactStore};
use certificate_service::notifier::{CertificateEmail, Notifier, NotifyError};
use certificate_service::storage::{StoreError, StoredRedemption};
use certificate_service::{MemoryArtifactStore, MemoryStore, Pipeline, RecordStore};
use ceu_common::{
    ArtifactRef, CertificateTemplate, ClassRecord, CreationEvent, Redemption, RedemptionPatch,
    RedemptionStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Notifier that records messages and optionally fails
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<CertificateEmail>>,
    pub fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn failing(message: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub async fn sent(&self) -> Vec<CertificateEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &CertificateEmail) -> Result<(), NotifyError> {
        self.sent.lock().await.push(email.clone());
        match &self.fail_with {
            Some(message) => Err(NotifyError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

/// Artifact store whose uploads always fail
pub struct FailingArtifactStore;

#[async_trait]
impl ArtifactStore for FailingArtifactStore {
    async fn put_certificate(
        &self,
        _class_id: &str,
        _redemption_id: &str,
        _bytes: Vec<u8>,
    ) -> Result<ArtifactRef, ArtifactError> {
        Err(ArtifactError::Upload("bucket unavailable".to_string()))
    }
}

/// Record store whose redemption writes fail; everything else is in memory
pub struct RejectingRedemptionStore {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl RecordStore for RejectingRedemptionStore {
    async fn create_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        self.inner.create_class(class).await
    }

    async fn get_class(&self, class_id: &str) -> Result<Option<ClassRecord>, StoreError> {
        self.inner.get_class(class_id).await
    }

    async fn list_classes(&self, owner_uid: &str) -> Result<Vec<ClassRecord>, StoreError> {
        self.inner.list_classes(owner_uid).await
    }

    async fn update_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        self.inner.update_class(class).await
    }

    async fn delete_class(&self, class_id: &str, owner_uid: &str) -> Result<(), StoreError> {
        self.inner.delete_class(class_id, owner_uid).await
    }

    async fn upsert_template(
        &self,
        class_id: &str,
        cert_id: &str,
        template: &CertificateTemplate,
    ) -> Result<(), StoreError> {
        self.inner.upsert_template(class_id, cert_id, template).await
    }

    async fn get_template(
        &self,
        class_id: &str,
        cert_id: &str,
    ) -> Result<Option<CertificateTemplate>, StoreError> {
        self.inner.get_template(class_id, cert_id).await
    }

    async fn reserve_issue(&self, class_id: &str, cert_id: &str) -> Result<bool, StoreError> {
        self.inner.reserve_issue(class_id, cert_id).await
    }

    async fn release_issue(&self, class_id: &str, cert_id: &str) -> Result<(), StoreError> {
        self.inner.release_issue(class_id, cert_id).await
    }

    async fn create_redemption(
        &self,
        _class_id: &str,
        _redemption_id: &str,
        _redemption: &Redemption,
    ) -> Result<(), StoreError> {
        Err(StoreError::Serialization(serde::de::Error::custom(
            "redemption writes unavailable",
        )))
    }

    async fn get_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        self.inner.get_redemption(class_id, redemption_id).await
    }

    async fn list_redemptions(
        &self,
        class_id: &str,
        status: Option<RedemptionStatus>,
        limit: usize,
    ) -> Result<Vec<StoredRedemption>, StoreError> {
        self.inner.list_redemptions(class_id, status, limit).await
    }

    async fn merge_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        patch: &RedemptionPatch,
    ) -> Result<(), StoreError> {
        self.inner.merge_redemption(class_id, redemption_id, patch).await
    }

    async fn enqueue_event(&self, event: &CreationEvent) -> Result<(), StoreError> {
        self.inner.enqueue_event(event).await
    }

    async fn next_event(&self, timeout: Duration) -> Result<Option<CreationEvent>, StoreError> {
        self.inner.next_event(timeout).await
    }
}

pub struct Harness {
    pub records: Arc<MemoryStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(notifier: RecordingNotifier) -> Self {
        Self {
            records: Arc::new(MemoryStore::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
            notifier: Arc::new(notifier),
        }
    }

    /// Pipeline with email delivery configured
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.records.clone(),
            self.artifacts.clone(),
            Some(self.notifier.clone()),
        )
    }

    /// Pipeline with no delivery credential
    pub fn unconfigured_pipeline(&self) -> Pipeline {
        Pipeline::new(self.records.clone(), self.artifacts.clone(), None)
    }
}

pub fn hvac_template() -> CertificateTemplate {
    serde_json::from_value(json!({
        "title": "HVAC 101",
        "ceuHours": 3,
        "issuerOrgName": "Acme",
        "qrMode": "live",
        "ownerUid": "owner-1"
    }))
    .unwrap()
}

pub fn redemption(email: &str, status: RedemptionStatus) -> Redemption {
    Redemption::new(email.to_string(), None, None, status)
}
