use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use tokio::sync::broadcast;
use zenith_api::{ApiConfig, ApiServer, AppState, HealthChecker, HealthConfig};
use zenith_common::{Signal, internal, logging};
use zenith_delivery::{Engine, EngineParts, LedgerConfig, WorkerConfig};
use zenith_queue::{DispatchQueue, QueueConfig, RetryPolicy};
use zenith_transport::TransportConfig;

use crate::StoreConfig;

/// The whole service, as described by `zenith.config.ron`
///
/// Every section may be left out, in which case its defaults apply.
#[derive(Debug, Default, Deserialize)]
pub struct Zenith {
    #[serde(default)]
    pub http: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM, then tell everything to stop
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Zenith {
    /// Assemble the engine from configuration
    ///
    /// # Errors
    /// If the store seed, queue or ledger cannot be opened
    pub async fn engine(&self) -> anyhow::Result<Engine> {
        let stores = self.store.open().await?;

        let queue = DispatchQueue::builder()
            .store(self.queue.open()?)
            .retry_policy(self.retry.clone())
            .lease_duration(self.workers.lease_duration())
            .poll_interval(self.workers.poll_interval())
            .open()
            .await?;

        let engine = Engine::new(EngineParts {
            campaigns: stores.campaigns,
            subscribers: stores.subscribers,
            queue: Arc::new(queue),
            ledger: self.ledger.open()?,
            transport: self.transport.build(),
            public_url: self.http.public_url.clone(),
        });

        engine.recover().await?;

        Ok(engine)
    }

    /// Run the engine, its workers and the HTTP surface until shut down
    ///
    /// # Errors
    /// If anything fails to initialise, or the HTTP server stops with an error
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let engine = self.engine().await?;
        let health = Arc::new(HealthChecker::new(self.health.max_queue_depth));
        health.set_queue_ready(true);

        internal!(
            level = INFO,
            "Dispatch queue ready with {} outstanding jobs",
            engine.queue().depth()
        );

        let workers = engine.spawn_workers(self.workers.concurrency, &SHUTDOWN_BROADCAST);
        health.set_workers_ready(true);

        let server = ApiServer::new(
            &self.http,
            AppState {
                engine: engine.clone(),
                health: Arc::clone(&health),
                open_wait: self.http.open_wait(),
            },
        )
        .await?;
        let mut server = tokio::spawn(server.serve(SHUTDOWN_BROADCAST.subscribe()));

        internal!(level = INFO, "Controller running");

        let early = tokio::select! {
            r = &mut server => Some(r),
            r = shutdown() => {
                if let Err(e) = r {
                    internal!(level = ERROR, "Signal handling failed: {e}");
                    let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
                }
                None
            }
        };

        let joined = match early {
            Some(joined) => {
                // The server stopped on its own; take everything else down with it
                let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
                joined
            }
            None => server.await,
        };
        let ret = joined
            .map_err(anyhow::Error::from)
            .and_then(|r| r.map_err(anyhow::Error::from));

        internal!(level = INFO, "Shutting down...");
        health.set_workers_ready(false);

        if let Err(e) = workers
            .shutdown_graceful(self.workers.shutdown_timeout())
            .await
        {
            internal!(level = WARN, "{e}");
        }

        let _ = SHUTDOWN_BROADCAST.send(Signal::Finalised);

        ret
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use zenith_common::CampaignStatus;
    use zenith_delivery::LaunchError;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let zenith: Zenith = ron::from_str("()").unwrap();

        assert_eq!(zenith.http, ApiConfig::default());
        assert_eq!(zenith.retry, RetryPolicy::default());
        assert_eq!(zenith.workers.concurrency, 50);
        assert_eq!(zenith.workers.lease_duration(), Duration::from_secs(120));
        assert_eq!(zenith.queue, QueueConfig::default());
        assert_eq!(zenith.store.seed, None);
        assert!(zenith.store.backend.path().is_some());
    }

    #[test]
    fn test_sample_config_parses() {
        let zenith: Zenith = ron::from_str(include_str!("../../zenith.config.ron")).unwrap();

        assert_eq!(zenith.http.listen_address, "[::]:3000");
        assert_eq!(zenith.retry.max_attempts, 3);
        assert!(matches!(zenith.transport, TransportConfig::Smtp(_)));
        assert!(zenith.queue.path().is_some());
        assert!(zenith.store.backend.path().is_some());
        assert_eq!(zenith.http.open_wait(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_engine_from_memory_config() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.ron");
        std::fs::write(
            &seed,
            r#"(
                campaigns: [(id: "c1", subject: "Hi", body: "<p>Hi</p>", status: DRAFT)],
                subscribers: [
                    (id: "s1", email: "one@example.com", status: ACTIVE),
                    (id: "s2", email: "two@example.com", status: UNSUBSCRIBED),
                ],
            )"#,
        )
        .unwrap();

        let config = format!(
            r#"(
                queue: Memory,
                ledger: Memory,
                transport: Log,
                store: (backend: Memory, seed: Some({seed:?})),
            )"#
        );
        let zenith: Zenith = ron::from_str(&config).unwrap();
        let engine = zenith.engine().await.unwrap();

        let report = engine.launch(&"c1".into()).await.unwrap();
        assert_eq!(report.enqueued, 1);
        assert_eq!(engine.queue().depth(), 1);
    }

    #[tokio::test]
    async fn test_campaign_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.ron");
        std::fs::write(
            &seed,
            r#"(
                campaigns: [(id: "c1", subject: "Hi", body: "<p>Hi</p>", status: DRAFT)],
                subscribers: [
                    (id: "s1", email: "one@example.com", status: ACTIVE),
                    (id: "s2", email: "two@example.com", status: ACTIVE),
                ],
            )"#,
        )
        .unwrap();

        let spool = dir.path().join("spool");
        let config = format!(
            r#"(
                queue: File(path: {queue:?}),
                ledger: File(path: {ledger:?}),
                transport: Log,
                store: (backend: File(path: {store:?}), seed: Some({seed:?})),
            )"#,
            queue = spool.join("queue"),
            ledger = spool.join("ledger"),
            store = spool.join("store"),
        );
        let zenith: Zenith = ron::from_str(&config).unwrap();

        let engine = zenith.engine().await.unwrap();
        assert_eq!(engine.launch(&"c1".into()).await.unwrap().enqueued, 2);
        drop(engine);

        // Same config, same seed: the launch is remembered, not reseeded
        let engine = zenith.engine().await.unwrap();
        let campaign = engine.campaign(&"c1".into()).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sending);
        assert_eq!(campaign.enqueued_count, 2);
        assert_eq!(engine.queue().depth(), 2);

        assert!(matches!(
            engine.launch(&"c1".into()).await,
            Err(LaunchError::AlreadyActive(_, CampaignStatus::Sending))
        ));
        assert_eq!(engine.queue().depth(), 2);
    }
}
