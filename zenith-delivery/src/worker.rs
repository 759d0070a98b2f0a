//! Processing of leased jobs
//!
//! One job goes through a transport slot reservation, the terminal-record
//! check, a lease renewal, the send, the ledger append, the counter update
//! with its completion check, and finally `ack`. The ledger write always
//! comes before the `ack`, so a crash in between only causes a redelivery,
//! which the terminal check then settles without sending again.

use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast;
use zenith_common::{CampaignStore, Counter, DeliveryRecord, DeliveryStatus, Signal, internal};
use zenith_queue::{DispatchQueue, Lease, NackOutcome, QueueError};
use zenith_transport::{SendSlot, TransportError, TransportPool};

use crate::{
    error::Result,
    ledger::{AppendOutcome, Ledger},
    render,
};

/// What happened to one leased job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Sent and recorded
    Sent { message_id: String },

    /// Sent, but a terminal record for the key already existed
    Duplicate,

    /// A terminal record already existed before sending, so nothing was sent
    AlreadyRecorded(DeliveryStatus),

    /// The attempt failed and the job will be handed out again
    Retrying { attempts: u32, retry_in: Duration },

    /// No attempts remain; the FAILED record was written
    Failed { attempts: u32, error: String },

    /// The lease expired before the send started; nothing was sent and the
    /// job belongs to whoever leased it next
    LeaseLost,
}

/// Everything a worker needs to settle a job
#[derive(Debug, Clone)]
pub struct Dispatcher {
    campaigns: Arc<dyn CampaignStore>,
    queue: Arc<DispatchQueue>,
    ledger: Arc<dyn Ledger>,
    transport: TransportPool,
    public_url: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        queue: Arc<DispatchQueue>,
        ledger: Arc<dyn Ledger>,
        transport: TransportPool,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            campaigns,
            queue,
            ledger,
            transport,
            public_url: public_url.into(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Settle one leased job
    ///
    /// Waits for a transport slot first; the lease is renewed once the slot
    /// is held so time spent waiting does not count against it.
    ///
    /// # Errors
    /// If the ledger, the campaign store or the queue fails. The lease is
    /// left to expire in that case and the job comes back later.
    pub async fn process(&self, lease: Lease) -> Result<JobOutcome> {
        match self.transport.reserve().await {
            Ok(slot) => self.process_with(lease, slot).await,
            Err(error) => self.failed_attempt(&lease, &error).await,
        }
    }

    async fn process_with(&self, lease: Lease, slot: SendSlot) -> Result<JobOutcome> {
        let job = lease.send_job();
        let key = job.tracking_key;

        if let Some(existing) = self.ledger.terminal(&key).await? {
            drop(slot);
            internal!(
                level = DEBUG,
                campaign_id = %job.campaign_id,
                tracking_key = %key,
                "Already recorded as {}, settling without sending",
                existing.status
            );
            self.count(&existing).await?;
            self.settle(&lease).await?;
            return Ok(JobOutcome::AlreadyRecorded(existing.status));
        }

        match self.queue.renew(lease.token()) {
            Err(QueueError::UnknownLease(token)) => {
                internal!(
                    level = WARN,
                    campaign_id = %job.campaign_id,
                    tracking_key = %key,
                    "Lease {token} expired before sending, leaving the job to its new holder"
                );
                return Ok(JobOutcome::LeaseLost);
            }
            other => other?,
        }

        let message = render::compose(job, &self.public_url);

        match slot.send(&message).await {
            Ok(receipt) => {
                let record = DeliveryRecord::new(
                    key,
                    job.campaign_id.clone(),
                    job.subscriber_id.clone(),
                    DeliveryStatus::Sent,
                )
                .with_provider_message_id(receipt.message_id.clone())
                .with_attempts(lease.attempt());

                let appended = self.record(record).await?;
                self.settle(&lease).await?;

                internal!(
                    level = DEBUG,
                    campaign_id = %job.campaign_id,
                    tracking_key = %key,
                    attempt = lease.attempt(),
                    "Sent {}",
                    receipt.message_id
                );

                Ok(match appended {
                    AppendOutcome::Duplicate => JobOutcome::Duplicate,
                    AppendOutcome::Recorded { .. } => JobOutcome::Sent {
                        message_id: receipt.message_id,
                    },
                })
            }
            Err(error) => self.failed_attempt(&lease, &error).await,
        }
    }

    async fn failed_attempt(&self, lease: &Lease, error: &TransportError) -> Result<JobOutcome> {
        let job = lease.send_job();
        let reason = error.to_string();

        match self
            .queue
            .nack(lease.token(), &reason, error.is_permanent())
            .await?
        {
            NackOutcome::Requeued { attempts, retry_in } => {
                internal!(
                    level = WARN,
                    campaign_id = %job.campaign_id,
                    tracking_key = %job.tracking_key,
                    attempt = attempts,
                    error = %error,
                    "Send failed, retrying in {retry_in:?}"
                );
                Ok(JobOutcome::Retrying { attempts, retry_in })
            }
            NackOutcome::Exhausted { attempts } => {
                internal!(
                    level = WARN,
                    campaign_id = %job.campaign_id,
                    tracking_key = %job.tracking_key,
                    attempt = attempts,
                    error = %error,
                    "Send failed for good"
                );

                let record = DeliveryRecord::new(
                    job.tracking_key,
                    job.campaign_id.clone(),
                    job.subscriber_id.clone(),
                    DeliveryStatus::Failed,
                )
                .with_attempts(attempts)
                .with_error(reason.clone());

                self.record(record).await?;
                self.settle(lease).await?;

                Ok(JobOutcome::Failed {
                    attempts,
                    error: reason,
                })
            }
        }
    }

    /// Append a terminal record, then count whichever terminal record the
    /// key ended up with
    async fn record(&self, record: DeliveryRecord) -> Result<AppendOutcome> {
        let appended = self.ledger.append(record.clone()).await?;

        let terminal = match appended {
            AppendOutcome::Recorded { .. } => record,
            AppendOutcome::Duplicate => self
                .ledger
                .terminal(&record.tracking_key)
                .await?
                .unwrap_or(record),
        };
        self.count(&terminal).await?;

        Ok(appended)
    }

    /// Move the campaign counter for a terminal record unless its key was
    /// counted already, then check whether the campaign has drained
    ///
    /// Safe to repeat for the same record: a redelivered job whose count
    /// failed the first time is counted here, and one that was counted is not.
    async fn count(&self, record: &DeliveryRecord) -> Result<()> {
        let campaign = &record.campaign_id;
        let key = &record.tracking_key;
        let counter = match record.status {
            DeliveryStatus::Sent => Counter::Sent,
            DeliveryStatus::Failed => Counter::Failed,
            DeliveryStatus::Opened => return Ok(()),
        };

        if self.ledger.claim_count(key, record.status).await? {
            if let Err(e) = self.campaigns.increment(campaign, counter).await {
                self.ledger.release_count(key, record.status).await?;
                return Err(e.into());
            }
        } else {
            internal!(
                level = DEBUG,
                campaign_id = %campaign,
                tracking_key = %key,
                "Already counted as {}",
                record.status
            );
        }

        if self.campaigns.complete_if_drained(campaign).await? {
            internal!(level = INFO, campaign_id = %campaign, "Campaign completed");
        }

        Ok(())
    }

    /// `ack` a lease, tolerating one that expired while the job was running
    ///
    /// The outcome is already in the ledger by then; the redelivered job
    /// will be settled by the terminal-record check.
    async fn settle(&self, lease: &Lease) -> Result<()> {
        match self.queue.ack(lease.token()).await {
            Err(QueueError::UnknownLease(token)) => {
                internal!(
                    level = WARN,
                    tracking_key = %lease.send_job().tracking_key,
                    "Lease {token} expired before the job was settled"
                );
                Ok(())
            }
            other => Ok(other?),
        }
    }

    /// Consume and process jobs until a shutdown signal arrives
    ///
    /// A worker holds a transport slot before it takes a job, so a lease is
    /// never spent queueing for the transport. Shutdown is only observed
    /// between jobs; a job being processed runs to completion.
    pub async fn run(&self, worker: usize, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(level = DEBUG, "Worker {worker} started");

        loop {
            let slot = tokio::select! {
                biased;

                signal = shutdown.recv() => {
                    internal!(level = DEBUG, "Worker {worker} stopping: {signal:?}");
                    break;
                }
                slot = self.transport.reserve() => match slot {
                    Ok(slot) => slot,
                    Err(e) => {
                        internal!(level = DEBUG, error = %e, "Worker {worker} stopping");
                        break;
                    }
                },
            };

            let lease = tokio::select! {
                biased;

                signal = shutdown.recv() => {
                    internal!(level = DEBUG, "Worker {worker} stopping: {signal:?}");
                    break;
                }
                lease = self.queue.consume() => lease,
            };

            if let Err(e) = self.process_with(lease, slot).await {
                internal!(
                    level = ERROR,
                    error = %e,
                    "Worker {worker} failed to settle a job, it will be redelivered"
                );
            }
        }
    }
}
