//! Trigger worker delivery and redelivery

mod common;

use certificate_service::worker::{Delivered, MAX_DELIVERY_ATTEMPTS};
use certificate_service::{Delivery, Disposition, Pipeline, RecordStore, Worker, WorkerConfig};
use ceu_common::{CreationEvent, RedemptionStatus};
use common::{redemption, FailingArtifactStore, Harness, RecordingNotifier};
use std::sync::Arc;
use std::time::Duration;

fn config() -> WorkerConfig {
    WorkerConfig {
        poll_timeout: Duration::from_millis(50),
        error_backoff: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_idle_when_queue_is_empty() {
    let harness = Harness::new(RecordingNotifier::default());
    let worker = Worker::new(0, config(), harness.pipeline());

    assert_eq!(worker.process_next().await.unwrap(), Delivered::Idle);
}

#[tokio::test]
async fn test_created_redemption_is_processed() {
    let harness = Harness::new(RecordingNotifier::default());
    harness
        .records
        .create_redemption("C1", "R1", &redemption("a@b.com", RedemptionStatus::Test))
        .await
        .unwrap();
    let worker = Worker::new(0, config(), harness.pipeline());

    assert_eq!(
        worker.process_next().await.unwrap(),
        Delivered::Completed(Disposition::Processed(Delivery::SkippedTestMode))
    );
    let record = harness.records.get_redemption("C1", "R1").await.unwrap().unwrap();
    assert_eq!(record.status, RedemptionStatus::Processed);
    assert!(harness.records.queued_events().await.is_empty());
}

#[tokio::test]
async fn test_event_for_missing_record_is_dropped() {
    let harness = Harness::new(RecordingNotifier::default());
    harness
        .records
        .enqueue_event(&CreationEvent::new("C1", "ghost"))
        .await
        .unwrap();
    let worker = Worker::new(0, config(), harness.pipeline());

    assert_eq!(worker.process_next().await.unwrap(), Delivered::MissingRecord);
    assert!(harness.records.queued_events().await.is_empty());
}

#[tokio::test]
async fn test_failed_run_is_redelivered_then_dropped() {
    let harness = Harness::new(RecordingNotifier::default());
    harness
        .records
        .create_redemption("C1", "R1", &redemption("a@b.com", RedemptionStatus::Pending))
        .await
        .unwrap();
    let pipeline = Pipeline::new(
        harness.records.clone(),
        Arc::new(FailingArtifactStore),
        Some(harness.notifier.clone()),
    );
    let worker = Worker::new(0, config(), pipeline);

    for attempt in 1..MAX_DELIVERY_ATTEMPTS {
        assert_eq!(worker.process_next().await.unwrap(), Delivered::Redelivered);
        let queued = harness.records.queued_events().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].attempt, attempt);
    }

    assert_eq!(worker.process_next().await.unwrap(), Delivered::Dropped);
    assert!(harness.records.queued_events().await.is_empty());

    let record = harness.records.get_redemption("C1", "R1").await.unwrap().unwrap();
    assert_eq!(record.status, RedemptionStatus::Pending);
}
