//! In-process record store for development and testing
//!
//! Same merge semantics as the Redis store, without a server.

use super::{
    class_path, owner_index, redemption_path, redemptions_index, select_redemptions,
    template_path, RecordStore, StoreError, StoredRedemption,
};
use async_trait::async_trait;
use ceu_common::document::{from_fields, merge_fields, to_fields, Fields};
use ceu_common::{
    CertificateTemplate, ClassRecord, CreationEvent, Redemption, RedemptionPatch, RedemptionStatus,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Default)]
struct State {
    documents: HashMap<String, Fields>,
    indexes: HashMap<String, BTreeSet<String>>,
    queue: VecDeque<CreationEvent>,
}

impl State {
    fn merge(&mut self, path: String, patch: Fields) {
        merge_fields(self.documents.entry(path).or_default(), patch);
    }

    fn index(&mut self, index: String, member: &str) {
        self.indexes
            .entry(index)
            .or_default()
            .insert(member.to_string());
    }

    fn members(&self, index: &str) -> Vec<String> {
        self.indexes
            .get(index)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn read<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        match self.documents.get(path) {
            Some(fields) => Ok(Some(from_fields(fields.clone())?)),
            None => Ok(None),
        }
    }
}

/// Record store held in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    queued: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw fields at a path, bypassing typed validation
    pub async fn insert_document(&self, path: &str, fields: Fields) {
        self.state.lock().await.merge(path.to_string(), fields);
    }

    /// Raw fields stored at a path
    pub async fn document(&self, path: &str) -> Option<Fields> {
        self.state.lock().await.documents.get(path).cloned()
    }

    /// Events waiting on the trigger queue
    pub async fn queued_events(&self) -> Vec<CreationEvent> {
        self.state.lock().await.queue.iter().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        let fields = to_fields(class)?;
        let mut state = self.state.lock().await;
        state.merge(class_path(&class.id), fields);
        state.index(owner_index(&class.owner_uid), &class.id);
        Ok(())
    }

    async fn get_class(&self, class_id: &str) -> Result<Option<ClassRecord>, StoreError> {
        self.state.lock().await.read(&class_path(class_id))
    }

    async fn list_classes(&self, owner_uid: &str) -> Result<Vec<ClassRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut classes = Vec::new();
        for class_id in state.members(&owner_index(owner_uid)) {
            if let Some(class) = state.read::<ClassRecord>(&class_path(&class_id))? {
                classes.push(class);
            }
        }
        classes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(classes)
    }

    async fn update_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        let fields = to_fields(class)?;
        self.state.lock().await.merge(class_path(&class.id), fields);
        Ok(())
    }

    async fn delete_class(&self, class_id: &str, owner_uid: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.documents.remove(&class_path(class_id));
        if let Some(members) = state.indexes.get_mut(&owner_index(owner_uid)) {
            members.remove(class_id);
        }
        Ok(())
    }

    async fn upsert_template(
        &self,
        class_id: &str,
        cert_id: &str,
        template: &CertificateTemplate,
    ) -> Result<(), StoreError> {
        let path = template_path(class_id, cert_id);
        let fields = to_fields(template)?;
        let created_at = serde_json::to_value(Utc::now())?;

        let mut state = self.state.lock().await;
        let document = state.documents.entry(path).or_default();
        merge_fields(document, fields);
        document
            .entry("createdAt")
            .or_insert(created_at);
        document
            .entry("issuedCount")
            .or_insert(Value::from(0));
        Ok(())
    }

    async fn get_template(
        &self,
        class_id: &str,
        cert_id: &str,
    ) -> Result<Option<CertificateTemplate>, StoreError> {
        self.state
            .lock()
            .await
            .read(&template_path(class_id, cert_id))
    }

    async fn reserve_issue(&self, class_id: &str, cert_id: &str) -> Result<bool, StoreError> {
        let path = template_path(class_id, cert_id);
        let mut state = self.state.lock().await;
        let document = state
            .documents
            .get_mut(&path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;

        let issued = document
            .get("issuedCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let cap = document.get("maxIssues").and_then(Value::as_u64);

        if cap.is_some_and(|cap| issued >= cap) {
            return Ok(false);
        }

        document.insert("issuedCount".to_string(), Value::from(issued + 1));
        Ok(true)
    }

    async fn release_issue(&self, class_id: &str, cert_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(document) = state.documents.get_mut(&template_path(class_id, cert_id)) {
            let issued = document
                .get("issuedCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            document.insert(
                "issuedCount".to_string(),
                Value::from(issued.saturating_sub(1)),
            );
        }
        Ok(())
    }

    async fn create_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        redemption: &Redemption,
    ) -> Result<(), StoreError> {
        let fields = to_fields(redemption)?;
        {
            let mut state = self.state.lock().await;
            state.merge(redemption_path(class_id, redemption_id), fields);
            state.index(redemptions_index(class_id), redemption_id);
            state
                .queue
                .push_back(CreationEvent::new(class_id, redemption_id));
        }
        self.queued.notify_waiters();
        Ok(())
    }

    async fn get_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        self.state
            .lock()
            .await
            .read(&redemption_path(class_id, redemption_id))
    }

    async fn list_redemptions(
        &self,
        class_id: &str,
        status: Option<RedemptionStatus>,
        limit: usize,
    ) -> Result<Vec<StoredRedemption>, StoreError> {
        let state = self.state.lock().await;
        let mut entries = Vec::new();
        for id in state.members(&redemptions_index(class_id)) {
            if let Some(redemption) = state.read(&redemption_path(class_id, &id))? {
                entries.push(StoredRedemption { id, redemption });
            }
        }
        Ok(select_redemptions(entries, status, limit))
    }

    async fn merge_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        patch: &RedemptionPatch,
    ) -> Result<(), StoreError> {
        let fields = to_fields(patch)?;
        debug!(class_id, redemption_id, fields = fields.len(), "Merging redemption patch");
        self.state
            .lock()
            .await
            .merge(redemption_path(class_id, redemption_id), fields);
        Ok(())
    }

    async fn enqueue_event(&self, event: &CreationEvent) -> Result<(), StoreError> {
        self.state.lock().await.queue.push_back(event.clone());
        self.queued.notify_waiters();
        Ok(())
    }

    async fn next_event(&self, timeout: Duration) -> Result<Option<CreationEvent>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.queued.notified();
            if let Some(event) = self.state.lock().await.queue.pop_front() {
                return Ok(Some(event));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
