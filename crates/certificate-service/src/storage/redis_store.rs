//! Redis-backed record store
//!
//! Each document is a Redis hash holding one JSON-encoded value per field, so
//! `HSET` of the patched fields is a merge-patch. Collections are indexed by
//! sets and the trigger queue is a list.

use super::{
    class_path, owner_index, redemption_path, redemptions_index, select_redemptions,
    template_path, RecordStore, StoreError, StoredRedemption, EVENT_QUEUE,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ceu_common::document::{decode_fields, encode_fields, from_fields, to_fields, Fields};
use ceu_common::{
    CertificateTemplate, ClassRecord, CreationEvent, Redemption, RedemptionPatch, RedemptionStatus,
};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Check-and-increment of `issuedCount` against `maxIssues`.
/// Returns the new count, -1 when the cap is reached, -2 when the template is missing.
const RESERVE_ISSUE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -2
end
local max = redis.call('HGET', KEYS[1], 'maxIssues')
if max and max ~= 'null' then
  local issued = tonumber(redis.call('HGET', KEYS[1], 'issuedCount') or '0') or 0
  if issued >= tonumber(max) then
    return -1
  end
end
return redis.call('HINCRBY', KEYS[1], 'issuedCount', 1)
";

/// Decrement of `issuedCount`, never below zero
const RELEASE_ISSUE_SCRIPT: &str = r"
local issued = tonumber(redis.call('HGET', KEYS[1], 'issuedCount') or '0') or 0
if issued > 0 then
  return redis.call('HINCRBY', KEYS[1], 'issuedCount', -1)
end
return 0
";

/// Record store on a Redis connection
pub struct RedisStore {
    conn: ConnectionManager,
    reserve_script: Script,
    release_script: Script,
}

impl RedisStore {
    /// Create a new store instance.
    ///
    /// `next_event` blocks its connection while waiting, so each worker
    /// should own a separate instance.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            reserve_script: Script::new(RESERVE_ISSUE_SCRIPT),
            release_script: Script::new(RELEASE_ISSUE_SCRIPT),
        })
    }

    async fn read_document(&self, path: &str) -> Result<Option<Fields>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(path).await?;

        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_fields(raw)?))
    }

    async fn write_fields(&self, path: &str, fields: &Fields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(path, &encode_fields(fields)).await?;

        debug!("Merged {} field(s) into {}", fields.len(), path);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn create_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        let fields = encode_fields(&to_fields(class)?);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(class_path(&class.id), &fields)
            .ignore()
            .sadd(owner_index(&class.owner_uid), &class.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(class_id = %class.id, owner_uid = %class.owner_uid, "Created class");
        Ok(())
    }

    async fn get_class(&self, class_id: &str) -> Result<Option<ClassRecord>, StoreError> {
        match self.read_document(&class_path(class_id)).await? {
            Some(fields) => Ok(Some(from_fields(fields)?)),
            None => Ok(None),
        }
    }

    async fn list_classes(&self, owner_uid: &str) -> Result<Vec<ClassRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let class_ids: Vec<String> = conn.smembers(owner_index(owner_uid)).await?;

        let mut classes = Vec::new();
        for class_id in class_ids {
            if let Some(class) = self.get_class(&class_id).await? {
                classes.push(class);
            }
        }

        classes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(classes)
    }

    async fn update_class(&self, class: &ClassRecord) -> Result<(), StoreError> {
        self.write_fields(&class_path(&class.id), &to_fields(class)?)
            .await?;

        info!(class_id = %class.id, "Updated class");
        Ok(())
    }

    async fn delete_class(&self, class_id: &str, owner_uid: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .del(class_path(class_id))
            .ignore()
            .srem(owner_index(owner_uid), class_id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(class_id, owner_uid, "Deleted class");
        Ok(())
    }

    async fn upsert_template(
        &self,
        class_id: &str,
        cert_id: &str,
        template: &CertificateTemplate,
    ) -> Result<(), StoreError> {
        let path = template_path(class_id, cert_id);
        let fields = encode_fields(&to_fields(template)?);
        let created_at = serde_json::to_string(&Utc::now())?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&path, &fields)
            .ignore()
            .hset_nx(&path, "createdAt", created_at)
            .ignore()
            .hset_nx(&path, "issuedCount", 0)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(class_id, cert_id, "Upserted certificate template");
        Ok(())
    }

    async fn get_template(
        &self,
        class_id: &str,
        cert_id: &str,
    ) -> Result<Option<CertificateTemplate>, StoreError> {
        match self.read_document(&template_path(class_id, cert_id)).await? {
            Some(fields) => Ok(Some(from_fields(fields)?)),
            None => Ok(None),
        }
    }

    async fn reserve_issue(&self, class_id: &str, cert_id: &str) -> Result<bool, StoreError> {
        let path = template_path(class_id, cert_id);
        let mut conn = self.conn.clone();

        let issued: i64 = self
            .reserve_script
            .key(&path)
            .invoke_async(&mut conn)
            .await?;

        match issued {
            -2 => Err(StoreError::NotFound(path)),
            -1 => {
                info!(class_id, cert_id, "Issue cap reached");
                Ok(false)
            }
            count => {
                debug!(class_id, cert_id, issued = count, "Reserved certificate issue");
                Ok(true)
            }
        }
    }

    async fn release_issue(&self, class_id: &str, cert_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();

        let issued: i64 = self
            .release_script
            .key(template_path(class_id, cert_id))
            .invoke_async(&mut conn)
            .await?;

        debug!(class_id, cert_id, issued, "Released certificate issue");
        Ok(())
    }

    async fn create_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
        redemption: &Redemption,
    ) -> Result<(), StoreError> {
        let fields = encode_fields(&to_fields(redemption)?);
        let event = serde_json::to_string(&CreationEvent::new(class_id, redemption_id))?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(redemption_path(class_id, redemption_id), &fields)
            .ignore()
            .sadd(redemptions_index(class_id), redemption_id)
            .ignore()
            .rpush(EVENT_QUEUE, event)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(
            class_id,
            redemption_id,
            status = redemption.status.as_str(),
            "Created redemption"
        );
        Ok(())
    }

    async fn get_redemption(
        &self,
        class_id: &str,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        match self
            .read_document(&redemption_path(class_id, redemption_id))
            .await?
        {
            Some(fields) => Ok(Some(from_fields(fields)?)),
            None => Ok(None),
        }
    }

    async fn list_redemptions(
        &self,
        class_id: &str,
        status: Option<RedemptionStatus>,
        limit: usize,
    ) -> Result<Vec<StoredRedemption>, StoreError> {
        let mut conn = self.conn.clone();
        let redemption_ids: Vec<String> = conn.smembers(redemptions_index(class_id)).await?;

        let mut entries = Vec::with_capacity(redemption_ids.len());
        for id in redemption_ids {
            if let Some(redemption) = self.get_redemption(class_id, &id).await? {
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
        self.write_fields(&redemption_path(class_id, redemption_id), &to_fields(patch)?)
            .await
    }

    async fn enqueue_event(&self, event: &CreationEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(EVENT_QUEUE, payload).await?;

        debug!(
            class_id = %event.class_id,
            redemption_id = %event.redemption_id,
            attempt = event.attempt,
            "Enqueued creation event"
        );
        Ok(())
    }

    async fn next_event(&self, timeout: Duration) -> Result<Option<CreationEvent>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(EVENT_QUEUE)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
