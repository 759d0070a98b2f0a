use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{sync::Notify, time::Instant};
use zenith_common::{CampaignId, internal, now_millis};

use crate::{
    BatchId, JobId, LeaseToken, MemoryQueueStore, QueueError, QueueStore, QueuedJob, Result,
    RetryPolicy, SendJob,
};

/// A job handed to exactly one consumer until it is settled or the lease
/// runs out
#[derive(Debug, Clone)]
pub struct Lease {
    token: LeaseToken,
    job: QueuedJob,
}

impl Lease {
    #[must_use]
    pub const fn token(&self) -> LeaseToken {
        self.token
    }

    #[must_use]
    pub const fn job(&self) -> &QueuedJob {
        &self.job
    }

    #[must_use]
    pub const fn send_job(&self) -> &SendJob {
        &self.job.job
    }

    /// 1-based number of the attempt this lease is for
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.job.attempt()
    }
}

/// What a `nack` did with the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// The job will be handed out again once `retry_in` has passed
    Requeued { attempts: u32, retry_in: Duration },

    /// No attempts remain, or the failure was permanent
    ///
    /// The job stays leased: the holder records the terminal failure and then
    /// settles the lease with `ack`.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs waiting to be handed out, including those backing off
    pub ready: usize,
    pub leased: usize,
    /// Jobs of paused campaigns
    pub held: usize,
    pub paused_campaigns: usize,
}

impl QueueStats {
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.ready + self.leased + self.held
    }
}

#[derive(Debug)]
struct Leased {
    job_id: JobId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, QueuedJob>,
    /// Unleased jobs of running campaigns, by availability then admission
    ready: BTreeSet<(u64, JobId)>,
    leases: HashMap<LeaseToken, Leased>,
    held: HashMap<CampaignId, Vec<JobId>>,
    paused: HashSet<CampaignId>,
}

impl State {
    /// Make an unleased job eligible for consumption, or hold it if its
    /// campaign is paused
    fn schedule(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };

        if self.paused.contains(&job.job.campaign_id) {
            self.held
                .entry(job.job.campaign_id.clone())
                .or_default()
                .push(id);
        } else {
            self.ready.insert((job.available_at_ms, id));
        }
    }

    fn reclaim_expired(&mut self, now: Instant, now_ms: u64) {
        let expired: Vec<LeaseToken> = self
            .leases
            .iter()
            .filter(|(_, leased)| leased.expires_at <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            if let Some(leased) = self.leases.remove(&token) {
                if let Some(job) = self.jobs.get_mut(&leased.job_id) {
                    job.available_at_ms = now_ms;
                    internal!(
                        level = WARN,
                        campaign_id = %job.job.campaign_id,
                        tracking_key = %job.job.tracking_key,
                        "Lease {token} expired, job {} is available again",
                        leased.job_id
                    );
                }
                self.schedule(leased.job_id);
            }
        }
    }

    fn next_wakeup(&self, now: Instant, now_ms: u64, poll_interval: Duration) -> Duration {
        let mut wait = poll_interval;

        if let Some(&(available_at, _)) = self.ready.first() {
            wait = wait.min(Duration::from_millis(available_at.saturating_sub(now_ms)));
        }

        if let Some(expiry) = self.leases.values().map(|leased| leased.expires_at).min() {
            wait = wait.min(expiry.saturating_duration_since(now));
        }

        wait
    }
}

/// Durable work queue of [`SendJob`]s
///
/// The working set lives behind a single mutex that is never held across an
/// await; persistence goes through the configured [`QueueStore`]. Ordering
/// is by availability time, then by admission, but consumers must not rely
/// on it.
#[derive(Debug)]
pub struct DispatchQueue {
    store: Arc<dyn QueueStore>,
    policy: RetryPolicy,
    lease_duration: Duration,
    poll_interval: Duration,
    state: Mutex<State>,
    available: Notify,
}

#[derive(Debug)]
pub struct DispatchQueueBuilder {
    store: Option<Arc<dyn QueueStore>>,
    policy: RetryPolicy,
    lease_duration: Duration,
    poll_interval: Duration,
}

impl Default for DispatchQueueBuilder {
    fn default() -> Self {
        Self {
            store: None,
            policy: RetryPolicy::default(),
            lease_duration: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl DispatchQueueBuilder {
    #[must_use]
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// How long a consumer may hold a job before it is handed to someone else
    #[must_use]
    pub const fn lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Upper bound on how long an idle consumer sleeps before looking again
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Compact the store and restore every outstanding job from it
    ///
    /// # Errors
    /// If the store cannot be read
    pub async fn open(self) -> Result<DispatchQueue> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryQueueStore::new()) as Arc<dyn QueueStore>);

        store.compact().await?;
        let jobs = store.load().await?;

        let mut state = State::default();
        for job in jobs {
            let id = job.id;
            state.jobs.insert(id, job);
            state.schedule(id);
        }

        if !state.jobs.is_empty() {
            internal!(
                level = INFO,
                "Restored {} outstanding jobs into the dispatch queue",
                state.jobs.len()
            );
        }

        Ok(DispatchQueue {
            store,
            policy: self.policy,
            lease_duration: self.lease_duration,
            poll_interval: self.poll_interval,
            state: Mutex::new(state),
            available: Notify::new(),
        })
    }
}

impl DispatchQueue {
    #[must_use]
    pub fn builder() -> DispatchQueueBuilder {
        DispatchQueueBuilder::default()
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Admit `jobs` as one batch
    ///
    /// The batch is committed to the store before any job becomes visible, so
    /// either every job is consumable or the call fails and none is.
    ///
    /// # Errors
    /// If the batch cannot be persisted
    pub async fn enqueue_batch(&self, jobs: Vec<SendJob>) -> Result<BatchId> {
        let batch = BatchId::generate();
        if jobs.is_empty() {
            return Ok(batch);
        }

        let now = now_millis();
        let queued: Vec<QueuedJob> = jobs
            .into_iter()
            .map(|job| QueuedJob::new(batch, job, now))
            .collect();

        self.store.commit_batch(batch, &queued).await?;

        let count = queued.len();
        {
            let mut state = self.state.lock();
            for job in queued {
                let id = job.id;
                state.jobs.insert(id, job);
                state.schedule(id);
            }
        }
        self.available.notify_waiters();

        internal!(level = DEBUG, "Enqueued batch {batch} of {count} jobs");

        Ok(batch)
    }

    /// Lease the next available job, if there is one right now
    pub fn try_consume(&self) -> Option<Lease> {
        let mut state = self.state.lock();
        self.lease_locked(&mut state)
    }

    /// Wait for a job and lease it
    ///
    /// Cancel safe: dropping the future before it resolves leases nothing.
    pub async fn consume(&self) -> Lease {
        loop {
            let mut notified = std::pin::pin!(self.available.notified());
            notified.as_mut().enable();

            let wait = {
                let mut state = self.state.lock();
                if let Some(lease) = self.lease_locked(&mut state) {
                    return lease;
                }
                state.next_wakeup(Instant::now(), now_millis(), self.poll_interval)
            };

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn lease_locked(&self, state: &mut State) -> Option<Lease> {
        let now = Instant::now();
        let now_ms = now_millis();
        state.reclaim_expired(now, now_ms);

        let &(available_at, id) = state.ready.first()?;
        if available_at > now_ms {
            return None;
        }
        state.ready.pop_first();

        let job = state.jobs.get(&id)?.clone();
        let token = LeaseToken::generate();
        state.leases.insert(
            token,
            Leased {
                job_id: id,
                expires_at: now + self.lease_duration,
            },
        );

        Some(Lease { token, job })
    }

    /// Restart the lease clock of a job that is still held
    ///
    /// A lease that ran out but has not been handed to anyone else yet is
    /// still held and can be renewed.
    ///
    /// # Errors
    /// [`QueueError::UnknownLease`] if the job has been reclaimed or settled
    pub fn renew(&self, token: LeaseToken) -> Result<()> {
        let mut state = self.state.lock();
        let leased = state
            .leases
            .get_mut(&token)
            .ok_or(QueueError::UnknownLease(token))?;
        leased.expires_at = Instant::now() + self.lease_duration;

        Ok(())
    }

    /// Settle a lease after the job reached its terminal outcome
    ///
    /// # Errors
    /// [`QueueError::UnknownLease`] if the lease was already settled or has
    /// expired, otherwise if the completion cannot be persisted
    pub async fn ack(&self, token: LeaseToken) -> Result<()> {
        let job = {
            let mut state = self.state.lock();
            let leased = state
                .leases
                .remove(&token)
                .ok_or(QueueError::UnknownLease(token))?;
            state.jobs.remove(&leased.job_id)
        };

        if let Some(job) = job {
            self.store.complete(&job).await?;
        }

        Ok(())
    }

    /// Report a failed attempt
    ///
    /// A transient failure with attempts remaining puts the job back after
    /// the retry policy's backoff. Otherwise the job is exhausted and stays
    /// leased for the caller to record and `ack`.
    ///
    /// # Errors
    /// [`QueueError::UnknownLease`] if the lease was already settled or has
    /// expired, otherwise if the retry state cannot be persisted
    pub async fn nack(&self, token: LeaseToken, error: &str, permanent: bool) -> Result<NackOutcome> {
        let (snapshot, outcome) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let job_id = state
                .leases
                .get(&token)
                .ok_or(QueueError::UnknownLease(token))?
                .job_id;
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or(QueueError::UnknownLease(token))?;

            job.attempts += 1;
            job.last_error = Some(error.to_string());

            if permanent || !self.policy.should_retry(job.attempts) {
                return Ok(NackOutcome::Exhausted {
                    attempts: job.attempts,
                });
            }

            let attempts = job.attempts;
            let retry_in = self.policy.delay_after(attempts);
            job.available_at_ms = now_millis()
                .saturating_add(u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX));

            let snapshot = job.clone();
            state.leases.remove(&token);
            state.schedule(job_id);

            (snapshot, NackOutcome::Requeued { attempts, retry_in })
        };
        self.available.notify_waiters();

        self.store.update(&snapshot).await?;

        Ok(outcome)
    }

    /// Stop handing out jobs of `campaign`
    ///
    /// Jobs already leased are unaffected. Returns `false` if the campaign
    /// was already paused.
    pub fn pause(&self, campaign: &CampaignId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.paused.insert(campaign.clone()) {
            return false;
        }

        let moving: Vec<(u64, JobId)> = state
            .ready
            .iter()
            .filter(|(_, id)| {
                state
                    .jobs
                    .get(id)
                    .is_some_and(|job| &job.job.campaign_id == campaign)
            })
            .copied()
            .collect();

        let held = state.held.entry(campaign.clone()).or_default();
        for entry in moving {
            state.ready.remove(&entry);
            held.push(entry.1);
        }

        internal!(
            level = INFO,
            campaign_id = %campaign,
            "Paused, holding {} jobs",
            held.len()
        );

        true
    }

    /// Resume handing out jobs of `campaign`
    ///
    /// Returns `false` if the campaign was not paused.
    pub fn resume(&self, campaign: &CampaignId) -> bool {
        {
            let mut state = self.state.lock();
            if !state.paused.remove(campaign) {
                return false;
            }

            let held = state.held.remove(campaign).unwrap_or_default();
            internal!(
                level = INFO,
                campaign_id = %campaign,
                "Resumed, releasing {} jobs",
                held.len()
            );

            for id in held {
                state.schedule(id);
            }
        }
        self.available.notify_waiters();

        true
    }

    #[must_use]
    pub fn is_paused(&self, campaign: &CampaignId) -> bool {
        self.state.lock().paused.contains(campaign)
    }

    /// Jobs not yet acknowledged, leased or not
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().jobs.len()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            ready: state.ready.len(),
            leased: state.leases.len(),
            held: state.held.values().map(Vec::len).sum(),
            paused_campaigns: state.paused.len(),
        }
    }
}
