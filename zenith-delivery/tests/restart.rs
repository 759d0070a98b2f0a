//! Campaigns survive a restart with file-backed queue and ledger

mod support;

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use support::{ScriptedTransport, engine, open_queue, seeded_store, wait_for_status};
use zenith_common::{CampaignId, CampaignStatus, DeliveryStatus, Subscriber};
use zenith_delivery::{Ledger, LedgerConfig};
use zenith_queue::QueueConfig;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unfinished_jobs_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let queue_config = QueueConfig::File {
        path: dir.path().join("queue"),
    };
    let ledger_config = LedgerConfig::File {
        path: dir.path().join("ledger"),
    };

    // The campaign store is external and outlives the process
    let store = seeded_store(
        (0..5)
            .map(|i| Subscriber::active(format!("s{i}"), format!("user{i}@example.com")))
            .collect(),
    )
    .await;
    let id = CampaignId::from("c1");

    let first_key = {
        let transport = Arc::new(ScriptedTransport::new());
        let queue = open_queue(queue_config.open().unwrap()).await;
        let ledger = ledger_config.open().unwrap();
        let engine = engine(&store, Arc::clone(&queue), ledger, Arc::clone(&transport), 2);

        engine.launch(&id).await.unwrap();

        // Settle one job, lease another and "crash" while holding it
        let dispatcher = engine.dispatcher();
        let lease = queue.try_consume().unwrap();
        let key = lease.send_job().tracking_key;
        dispatcher.process(lease).await.unwrap();
        let _abandoned = queue.try_consume().unwrap();

        assert_eq!(transport.total_attempts(), 1);
        key
    };

    let transport = Arc::new(ScriptedTransport::new());
    let queue = open_queue(queue_config.open().unwrap()).await;
    assert_eq!(queue.depth(), 4, "the abandoned lease is available again");

    let ledger = ledger_config.open().unwrap();
    let engine = engine(
        &store,
        Arc::clone(&queue),
        Arc::clone(&ledger),
        Arc::clone(&transport),
        2,
    );
    engine.recover().await.unwrap();

    let (shutdown, _) = tokio::sync::broadcast::channel(1);
    let workers = engine.spawn_workers(4, &shutdown);
    let campaign = wait_for_status(&store, &id, CampaignStatus::Completed).await;
    workers
        .shutdown_graceful(Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(campaign.counters.sent_count, 5);
    assert_eq!(transport.total_attempts(), 4);
    assert_eq!(
        ledger.terminal(&first_key).await.unwrap().unwrap().status,
        DeliveryStatus::Sent
    );
    assert_eq!(queue.depth(), 0);
}

#[tokio::test]
async fn test_pause_survives_restart() {
    let store = seeded_store(vec![Subscriber::active("s1", "one@example.com")]).await;
    let id = CampaignId::from("c1");
    let queue_store: Arc<dyn zenith_queue::QueueStore> =
        Arc::new(zenith_queue::MemoryQueueStore::new());
    let ledger: Arc<dyn Ledger> = Arc::new(zenith_delivery::MemoryLedger::new());

    {
        let queue = open_queue(Arc::clone(&queue_store)).await;
        let engine = engine(
            &store,
            queue,
            Arc::clone(&ledger),
            Arc::new(ScriptedTransport::new()),
            1,
        );
        engine.launch(&id).await.unwrap();
        engine.pause(&id).await.unwrap();
    }

    let queue = open_queue(queue_store).await;
    let engine = engine(
        &store,
        Arc::clone(&queue),
        ledger,
        Arc::new(ScriptedTransport::new()),
        1,
    );
    assert_eq!(queue.depth(), 1);

    engine.recover().await.unwrap();
    assert!(queue.is_paused(&id));
    assert!(queue.try_consume().is_none());

    engine.resume(&id).await.unwrap();
    assert!(queue.try_consume().is_some());
}
