//! Record store for classes, certificate templates and redemptions
//!
//! Documents live at hierarchical paths (`classes/{classId}/redemptions/{id}`)
//! and every write is a merge-patch: fields not named by a write survive it.
//! The store also carries the redemption-created trigger queue so that
//! creating a redemption and emitting its event happen together.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use ceu_common::{
    CertificateTemplate, ClassRecord, CreationEvent, Outcome, Redemption, RedemptionPatch,
    RedemptionStatus,
};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

/// Trigger queue for created redemptions
pub const EVENT_QUEUE: &str = "triggers:redemption-created";

/// Record store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Document error: {0}")]
    Document(#[from] ceu_common::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// A redemption together with its identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRedemption {
    pub id: String,

    #[serde(flatten)]
    pub redemption: Redemption,
}

/// Document store used by the API and the redemption pipeline
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a class and index it under its owner
    async fn create_class(&self, class: &ClassRecord) -> Result<(), StoreError>;

    async fn get_class(&self, class_id: &str) -> Result<Option<ClassRecord>, StoreError>;

    /// Classes owned by a creator, newest first
    async fn list_classes(&self, owner_uid: &str) -> Result<Vec<ClassRecord>, StoreError>;

    /// Merge an edited class over the stored one
    async fn update_class(&self, class: &ClassRecord) -> Result<(), StoreError>;

    /// Remove a class document and its owner index entry. Templates and
    /// redemptions under the class are left in place.
    async fn delete_class(&self, class_id: &str, owner_uid: &str) -> Result<(), StoreError>;

    /// Merge-upsert a certificate template. `issuedCount` and `createdAt` are
    /// initialised on first write and never reset.
    async fn upsert_template(
        &self,
        class_id: &str,
        cert_id: &str,
        template: &CertificateTemplate,
    ) -> Result<(), StoreError>;

    async fn get_template(
        &self,
        class_id: &str,
        cert_id: &str,
    ) -> Result<Option<CertificateTemplate>, StoreError>;

    /// Atomically count one more issue against the template's cap.
    /// Returns `false` when the cap is already reached.
    async fn reserve_issue(&self, class_id: &str, cert_id: &str) -> Result<bool, StoreError>;

    /// Give back an issue reserved for a redemption that was never written
    async fn release_issue(&self, class_id: &str, cert_id: &str) -> Result<(), StoreError>;

    /// Write a new redemption and emit its creation event
    async fn create_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        redemption: &Redemption,
    ) -> Result<(), StoreError>;

    async fn get_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError>;

    /// Redemptions of a class, newest first, optionally filtered by status
    async fn list_redemptions(
        &self,
        class_id: &str,
        status: Option<RedemptionStatus>,
        limit: usize,
    ) -> Result<Vec<StoredRedemption>, StoreError>;

    /// Merge-patch a redemption record
    async fn merge_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        patch: &RedemptionPatch,
    ) -> Result<(), StoreError>;

    /// Record the outcome of a pipeline run on the record it started from
    async fn apply_outcome(
        &self,
        class_id: &str,
        redemption_id: &str,
        previous: &Redemption,
        outcome: &Outcome,
    ) -> Result<(), StoreError> {
        let patch = outcome.settle(previous, Utc::now());
        self.merge_redemption(class_id, redemption_id, &patch).await
    }

    /// Put an event (back) on the trigger queue
    async fn enqueue_event(&self, event: &CreationEvent) -> Result<(), StoreError>;

    /// Wait up to `timeout` for the next creation event
    async fn next_event(&self, timeout: Duration) -> Result<Option<CreationEvent>, StoreError>;
}

pub fn class_path(class_id: &str) -> String {
    format!("classes/{class_id}")
}

pub fn template_path(class_id: &str, cert_id: &str) -> String {
    format!("classes/{class_id}/certificates/{cert_id}")
}

pub fn redemption_path(class_id: &str, redemption_id: &str) -> String {
    format!("classes/{class_id}/redemptions/{redemption_id}")
}

fn redemptions_index(class_id: &str) -> String {
    format!("classes/{class_id}/redemptions")
}

fn owner_index(owner_uid: &str) -> String {
    format!("owners/{owner_uid}/classes")
}

/// Newest first, then status filter and limit
fn select_redemptions(
    mut entries: Vec<StoredRedemption>,
    status: Option<RedemptionStatus>,
    limit: usize,
) -> Vec<StoredRedemption> {
    if let Some(status) = status {
        entries.retain(|entry| entry.redemption.status == status);
    }
    entries.sort_by(|a, b| {
        b.redemption
            .created_at
            .cmp(&a.redemption.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(id: &str, status: RedemptionStatus, age_minutes: i64) -> StoredRedemption {
        let mut redemption = Redemption::new("a@b.com".to_string(), None, None, status);
        redemption.created_at = Some(Utc::now() - ChronoDuration::minutes(age_minutes));
        StoredRedemption {
            id: id.to_string(),
            redemption,
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(template_path("C1", "default"), "classes/C1/certificates/default");
        assert_eq!(redemption_path("C1", "R1"), "classes/C1/redemptions/R1");
    }

    #[test]
    fn test_select_orders_filters_and_limits() {
        let entries = vec![
            entry("old", RedemptionStatus::Processed, 30),
            entry("new", RedemptionStatus::Processed, 1),
            entry("open", RedemptionStatus::Pending, 5),
            entry("mid", RedemptionStatus::Processed, 10),
        ];

        let selected = select_redemptions(entries, Some(RedemptionStatus::Processed), 2);
        let ids: Vec<&str> = selected.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn test_stored_redemption_flattens() {
        let value = serde_json::to_value(entry("R1", RedemptionStatus::Test, 0)).unwrap();
        assert_eq!(value["id"], "R1");
        assert_eq!(value["status"], "test");
        assert_eq!(value["learnerEmail"], "a@b.com");
    }
}
