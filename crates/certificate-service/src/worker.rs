//! Trigger worker - delivers redemption-created events to the pipeline

use crate::pipeline::{Disposition, Pipeline};
use crate::storage::StoreError;
use ceu_common::CreationEvent;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Deliveries per event before it is dropped
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long one queue poll waits for an event
    pub poll_timeout: Duration,

    /// Pause after a failed queue read
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// What happened to one polled event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// Nothing arrived before the poll timeout
    Idle,
    /// The event named a redemption that does not exist
    MissingRecord,
    /// The pipeline ran to completion
    Completed(Disposition),
    /// The pipeline failed and the event was queued again
    Redelivered,
    /// The pipeline failed on the last allowed attempt
    Dropped,
}

/// Trigger worker
pub struct Worker {
    id: usize,
    config: WorkerConfig,
    pipeline: Pipeline,
}

impl Worker {
    pub fn new(id: usize, config: WorkerConfig, pipeline: Pipeline) -> Self {
        Self {
            id,
            config,
            pipeline,
        }
    }

    /// Start the worker loop
    pub async fn run(&self) {
        info!(worker = self.id, "Redemption worker started, waiting for events...");

        loop {
            if let Err(e) = self.process_next().await {
                error!(worker = self.id, "Error reading trigger queue: {}", e);
                tokio::time::sleep(self.config.error_backoff).await;
            }
        }
    }

    /// Wait for one event and deliver it
    pub async fn process_next(&self) -> Result<Delivered, StoreError> {
        let records = self.pipeline.records();

        let Some(event) = records.next_event(self.config.poll_timeout).await? else {
            return Ok(Delivered::Idle);
        };

        let redemption = match records
            .get_redemption(&event.class_id, &event.redemption_id)
            .await
        {
            Ok(Some(redemption)) => redemption,
            Ok(None) => {
                warn!(
                    class_id = %event.class_id,
                    redemption_id = %event.redemption_id,
                    "Redemption record not found, dropping event"
                );
                return Ok(Delivered::MissingRecord);
            }
            Err(e) => {
                error!(
                    class_id = %event.class_id,
                    redemption_id = %event.redemption_id,
                    "Failed to load redemption: {}", e
                );
                return self.redeliver(&event).await;
            }
        };

        match self.pipeline.handle(&event, &redemption).await {
            Ok(disposition) => {
                debug!(
                    class_id = %event.class_id,
                    redemption_id = %event.redemption_id,
                    ?disposition,
                    "Redemption handled"
                );
                Ok(Delivered::Completed(disposition))
            }
            Err(e) => {
                error!(
                    class_id = %event.class_id,
                    redemption_id = %event.redemption_id,
                    email = %redemption.learner_email,
                    attempt = event.attempt,
                    "Redemption pipeline failed: {}", e
                );
                self.redeliver(&event).await
            }
        }
    }

    async fn redeliver(&self, event: &CreationEvent) -> Result<Delivered, StoreError> {
        let next = event.redelivery();
        if next.attempt >= MAX_DELIVERY_ATTEMPTS {
            error!(
                class_id = %event.class_id,
                redemption_id = %event.redemption_id,
                "Giving up after {} attempts", MAX_DELIVERY_ATTEMPTS
            );
            return Ok(Delivered::Dropped);
        }

        self.pipeline.records().enqueue_event(&next).await?;
        Ok(Delivered::Redelivered)
    }
}

/// Spawn one task per worker
pub fn spawn_workers(workers: Vec<Worker>) -> Vec<JoinHandle<()>> {
    workers
        .into_iter()
        .map(|worker| tokio::spawn(async move { worker.run().await }))
        .collect()
}
