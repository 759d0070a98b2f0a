use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use zenith_common::TrackingKey;
use zenith_queue::{
    DispatchQueue, FileQueueStore, MemoryQueueStore, NackOutcome, QueueStore, RetryPolicy, SendJob,
};

fn send_job(subscriber: &str) -> SendJob {
    SendJob {
        campaign_id: "spring".into(),
        subscriber_id: subscriber.into(),
        email: format!("{subscriber}@example.com"),
        subject: "Spring sale".to_string(),
        body: "<p>Everything must go</p>".to_string(),
        tracking_key: TrackingKey::generate(),
    }
}

async fn open(store: Arc<dyn QueueStore>) -> DispatchQueue {
    DispatchQueue::builder()
        .store(store)
        .retry_policy(RetryPolicy {
            base_delay_ms: 1,
            ..RetryPolicy::default()
        })
        .poll_interval(Duration::from_millis(5))
        .open()
        .await
        .unwrap()
}

fn file_store(dir: &tempfile::TempDir) -> Arc<dyn QueueStore> {
    let store = FileQueueStore::new(dir.path().join("queue")).unwrap();
    store.init().unwrap();
    Arc::new(store)
}

#[tokio::test]
async fn test_unacknowledged_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (acked, failed_once) = {
        let queue = open(file_store(&dir)).await;
        queue
            .enqueue_batch(vec![send_job("s1"), send_job("s2"), send_job("s3")])
            .await
            .unwrap();

        let first = queue.try_consume().unwrap();
        queue.ack(first.token()).await.unwrap();

        let second = queue.try_consume().unwrap();
        let outcome = queue
            .nack(second.token(), "421 too busy", false)
            .await
            .unwrap();
        assert!(matches!(outcome, NackOutcome::Requeued { attempts: 1, .. }));

        // The third job stays leased when the process "dies"
        let _in_flight = queue.try_consume();

        (first.job().id, second.job().id)
    };

    let queue = open(file_store(&dir)).await;
    assert_eq!(queue.depth(), 2);

    let mut restored = Vec::new();
    while restored.len() < 2 {
        let lease = tokio::time::timeout(Duration::from_secs(2), queue.consume())
            .await
            .unwrap();
        restored.push(lease);
    }

    assert!(restored.iter().all(|lease| lease.job().id != acked));

    let retried = restored
        .iter()
        .find(|lease| lease.job().id == failed_once)
        .unwrap();
    assert_eq!(retried.attempt(), 2);
    assert_eq!(retried.job().last_error.as_deref(), Some("421 too busy"));

    for lease in &restored {
        queue.ack(lease.token()).await.unwrap();
    }
    assert_eq!(queue.depth(), 0);

    // A third start finds nothing and compacts the finished batch away
    let queue = open(file_store(&dir)).await;
    assert_eq!(queue.depth(), 0);
    let batches = std::fs::read_dir(dir.path().join("queue").join("batches"))
        .unwrap()
        .count();
    assert_eq!(batches, 0);
}

#[tokio::test]
async fn test_memory_store_shared_between_queues() {
    let store = MemoryQueueStore::new();

    {
        let queue = open(Arc::new(store.clone())).await;
        queue
            .enqueue_batch(vec![send_job("s1"), send_job("s2")])
            .await
            .unwrap();
        let lease = queue.try_consume().unwrap();
        queue.ack(lease.token()).await.unwrap();
    }

    assert_eq!(store.len(), 1);
    let queue = open(Arc::new(store)).await;
    assert_eq!(queue.depth(), 1);
}

#[tokio::test]
async fn test_paused_campaign_reapplied_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let queue = open(file_store(&dir)).await;
        queue.enqueue_batch(vec![send_job("s1")]).await.unwrap();
        queue.pause(&"spring".into());
    }

    let queue = open(file_store(&dir)).await;
    queue.pause(&"spring".into());
    assert!(queue.try_consume().is_none());
    assert_eq!(queue.stats().held, 1);

    queue.resume(&"spring".into());
    assert!(queue.try_consume().is_some());
}
