use std::{
    fmt::Write as _,
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};

use super::{CampaignStore, MemoryStore, Result, Seed, StoreError, SubscriberStore};
use crate::{
    internal,
    model::{
        Campaign, CampaignCounters, CampaignId, CampaignStatus, Counter, Subscriber, SubscriberId,
    },
};

const CAMPAIGNS: &str = "campaigns";
const SUBSCRIBERS: &str = "subscribers";
const TEMP_PREFIX: &str = ".tmp_";
const ROW_SUFFIX: &str = ".row";

/// Campaign and subscriber store persisted as one file per row
///
/// ```text
/// {path}/campaigns/{hex id}.row      one campaign (bincode)
/// {path}/subscribers/{hex id}.row    one subscriber (bincode)
/// ```
///
/// Every row is loaded into a [`MemoryStore`] at open and reads are served
/// from there. Mutations are serialised by a single write lock: the row is
/// changed in memory, written to a `.tmp_` sibling and renamed into place.
/// If the write fails the in-memory row is put back, so memory never holds a
/// change the disk does not.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    rows: MemoryStore,
    writes: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store at `path`, creating it if needed
    ///
    /// # Errors
    /// If the path is relative, contains `..` or points into a system
    /// directory, or if a row cannot be read
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;

        if path.try_exists()? && !path.is_dir() {
            return Err(Error::new(
                ErrorKind::NotADirectory,
                format!("Expected {} to be a Directory, but it is not", path.display()),
            )
            .into());
        }

        let seed = Seed {
            campaigns: load_table(&path.join(CAMPAIGNS))?,
            subscribers: load_table(&path.join(SUBSCRIBERS))?,
        };

        internal!(
            level = INFO,
            "Opened store at {} with {} campaigns and {} subscribers",
            path.display(),
            seed.campaigns.len(),
            seed.subscribers.len()
        );

        Ok(Self {
            path,
            rows: MemoryStore::from_seed(seed),
            writes: Arc::default(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_path(path: &Path) -> Result<()> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(StoreError::InvalidPath(format!(
                "Store path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(StoreError::InvalidPath(format!(
                "Store path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(StoreError::InvalidPath(format!(
                "Store path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Add the seed's campaigns and subscribers that are not stored yet
    ///
    /// Rows already on disk win, so reseeding on every start never resets a
    /// launched campaign. Returns how many rows were added.
    ///
    /// # Errors
    /// If a row cannot be written
    pub async fn seed(&self, seed: Seed) -> Result<usize> {
        let _writes = self.writes.lock().await;
        let mut added = 0;

        for campaign in seed.campaigns {
            if self.rows.campaign(&campaign.id).await.is_ok() {
                continue;
            }
            self.write_row(CAMPAIGNS, campaign.id.as_str(), &campaign)
                .await?;
            self.rows.save_campaign(campaign).await?;
            added += 1;
        }

        for subscriber in seed.subscribers {
            if self.rows.subscriber(&subscriber.id).await.is_ok() {
                continue;
            }
            self.write_row(SUBSCRIBERS, subscriber.id.as_str(), &subscriber)
                .await?;
            self.rows.save_subscriber(subscriber).await?;
            added += 1;
        }

        Ok(added)
    }

    async fn write_row<T: Serialize>(&self, table: &str, id: &str, row: &T) -> Result<()> {
        let dir = self.path.join(table);
        let encoded = bincode::serde::encode_to_vec(row, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let temp = dir.join(format!("{TEMP_PREFIX}{}", ulid::Ulid::new()));
        fs::write(&temp, &encoded).await?;
        fs::rename(&temp, dir.join(row_file(id))).await?;

        Ok(())
    }

    /// Persist the in-memory row of `before.id`, restoring `before` if that
    /// fails
    ///
    /// Callers hold the write lock.
    async fn commit(&self, before: Campaign) -> Result<()> {
        let after = self.rows.campaign(&before.id).await?;

        if let Err(e) = self.write_row(CAMPAIGNS, after.id.as_str(), &after).await {
            internal!(
                level = ERROR,
                campaign_id = %before.id,
                error = %e,
                "Failed to persist campaign, change rolled back"
            );
            self.rows.save_campaign(before).await?;
            return Err(e);
        }

        Ok(())
    }
}

/// Hex-encode an id so any string is a safe file name
fn row_file(id: &str) -> String {
    let mut name = String::with_capacity(id.len() * 2 + ROW_SUFFIX.len());
    for byte in id.bytes() {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(ROW_SUFFIX);
    name
}

/// Read every row of one table, removing temp files of interrupted writes
fn load_table<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    std::fs::create_dir_all(dir)?;

    let mut rows = Vec::new();
    let mut cleaned = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let filename = entry.file_name();
        let filename = filename.to_string_lossy();

        if filename.starts_with(TEMP_PREFIX) {
            std::fs::remove_file(entry.path())?;
            cleaned += 1;
            continue;
        }
        if !filename.ends_with(ROW_SUFFIX) {
            continue;
        }

        let bytes = std::fs::read(entry.path())?;
        let (row, _): (T, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| StoreError::Serialization(format!("{filename}: {e}")))?;
        rows.push(row);
    }

    if cleaned > 0 {
        internal!(
            level = INFO,
            "Cleaned up {cleaned} interrupted writes in {}",
            dir.display()
        );
    }

    Ok(rows)
}

#[async_trait]
impl CampaignStore for FileStore {
    async fn campaign(&self, id: &CampaignId) -> Result<Campaign> {
        self.rows.campaign(id).await
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>> {
        self.rows.campaigns().await
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.write_row(CAMPAIGNS, campaign.id.as_str(), &campaign)
            .await?;
        self.rows.save_campaign(campaign).await
    }

    async fn begin_sending(&self, id: &CampaignId, enqueued: u64) -> Result<CampaignStatus> {
        let _writes = self.writes.lock().await;
        let before = self.rows.campaign(id).await?;
        let previous = self.rows.begin_sending(id, enqueued).await?;
        self.commit(before).await?;
        Ok(previous)
    }

    async fn transition(
        &self,
        id: &CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign> {
        let _writes = self.writes.lock().await;
        let before = self.rows.campaign(id).await?;
        let campaign = self.rows.transition(id, from, to).await?;
        self.commit(before).await?;
        Ok(campaign)
    }

    async fn increment(&self, id: &CampaignId, counter: Counter) -> Result<CampaignCounters> {
        let _writes = self.writes.lock().await;
        let before = self.rows.campaign(id).await?;
        let counters = self.rows.increment(id, counter).await?;
        self.commit(before).await?;
        Ok(counters)
    }

    async fn complete_if_drained(&self, id: &CampaignId) -> Result<bool> {
        let _writes = self.writes.lock().await;
        let before = self.rows.campaign(id).await?;
        if !self.rows.complete_if_drained(id).await? {
            return Ok(false);
        }
        self.commit(before).await?;
        Ok(true)
    }
}

#[async_trait]
impl SubscriberStore for FileStore {
    async fn subscriber(&self, id: &SubscriberId) -> Result<Subscriber> {
        self.rows.subscriber(id).await
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        self.rows.subscribers().await
    }

    async fn save_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.write_row(SUBSCRIBERS, subscriber.id.as_str(), &subscriber)
            .await?;
        self.rows.save_subscriber(subscriber).await
    }
}
