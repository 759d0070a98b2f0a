use std::{
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use zenith_common::{DeliveryRecord, DeliveryStatus, TrackingKey, internal};

use super::{AppendOutcome, Ledger, LedgerError, Result};

const TEMP_PREFIX: &str = ".tmp_";
const RECORD_SUFFIX: &str = ".rec";
const TERMINAL: &str = "terminal.rec";
const FIRST_OPEN: &str = "opened.rec";
const COUNT_MARK_SUFFIX: &str = ".mark";

/// Ledger persisted as one directory per tracking key
///
/// ```text
/// {path}/{key}/terminal.rec          the SENT or FAILED record
/// {path}/{key}/opened.rec            the first OPENED record
/// {path}/{key}/opened-{ulid}.rec     every later OPENED record
/// {path}/{key}/counted-{status}.mark  present once the status was counted
/// ```
///
/// Records are written to a `.tmp_` file first and then hard-linked to
/// their final name. Linking fails if the name is taken, which makes
/// `terminal.rec` and `opened.rec` insert-if-absent even across processes.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl Default for FileLedger {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/zenith/ledger"),
        }
    }
}

impl FileLedger {
    /// # Errors
    /// If the path is relative, contains `..`, or points into a system directory
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self { path })
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
            return Err(LedgerError::Validation(format!(
                "Ledger path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(LedgerError::Validation(format!(
                "Ledger path must be absolute: {}",
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
            return Err(LedgerError::Validation(format!(
                "Ledger path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the ledger directory and remove temp files left by interrupted
    /// appends
    ///
    /// # Errors
    /// If the directory cannot be created, or the path exists and is not a
    /// directory
    pub fn init(&self) -> Result<()> {
        internal!("Initialising ledger at {}", self.path.display());

        if self.path.try_exists()? && !self.path.is_dir() {
            return Err(Error::new(
                ErrorKind::NotADirectory,
                format!(
                    "Expected {} to be a Directory, but it is not",
                    self.path.display()
                ),
            )
            .into());
        }

        std::fs::create_dir_all(&self.path)?;

        let mut cleaned = 0;
        for key_dir in std::fs::read_dir(&self.path)? {
            let key_dir = key_dir?;
            if !key_dir.file_type()?.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(key_dir.path())? {
                let entry = entry?;
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    std::fs::remove_file(entry.path())?;
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} interrupted ledger writes"
            );
        }

        Ok(())
    }

    fn key_dir(&self, key: &TrackingKey) -> PathBuf {
        self.path.join(key.to_string())
    }

    fn count_mark(&self, key: &TrackingKey, status: DeliveryStatus) -> PathBuf {
        self.key_dir(key)
            .join(format!("counted-{status}{COUNT_MARK_SUFFIX}"))
    }

    /// Link `temp` to `dir/name` unless that name already exists
    async fn link_if_absent(temp: &Path, dir: &Path, name: &str) -> Result<bool> {
        match fs::hard_link(temp, dir.join(name)).await {
            Ok(()) => {
                fs::remove_file(temp).await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn append(&self, record: DeliveryRecord) -> Result<AppendOutcome> {
        let dir = self.key_dir(&record.tracking_key);
        fs::create_dir_all(&dir).await?;

        let encoded = bincode::serde::encode_to_vec(&record, bincode::config::standard())?;
        let unique = ulid::Ulid::new();
        let temp = dir.join(format!("{TEMP_PREFIX}{unique}"));
        fs::write(&temp, &encoded).await?;

        if record.status.is_terminal() {
            if Self::link_if_absent(&temp, &dir, TERMINAL).await? {
                return Ok(AppendOutcome::Recorded {
                    first_of_status: true,
                });
            }

            fs::remove_file(&temp).await?;
            return Ok(AppendOutcome::Duplicate);
        }

        if Self::link_if_absent(&temp, &dir, FIRST_OPEN).await? {
            return Ok(AppendOutcome::Recorded {
                first_of_status: true,
            });
        }

        fs::rename(&temp, dir.join(format!("opened-{unique}{RECORD_SUFFIX}"))).await?;
        Ok(AppendOutcome::Recorded {
            first_of_status: false,
        })
    }

    async fn claim_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<bool> {
        fs::create_dir_all(self.key_dir(key)).await?;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.count_mark(key, status))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_count(&self, key: &TrackingKey, status: DeliveryStatus) -> Result<()> {
        match fs::remove_file(self.count_mark(key, status)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn find_by_key(&self, key: &TrackingKey) -> Result<Vec<DeliveryRecord>> {
        let mut entries = match fs::read_dir(self.key_dir(key)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();
            if filename.starts_with(TEMP_PREFIX) || !filename.ends_with(RECORD_SUFFIX) {
                continue;
            }

            let bytes = fs::read(entry.path()).await?;
            let (record, _): (DeliveryRecord, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
            records.push(record);
        }

        records.sort_by_key(|record| (record.recorded_at, record.status != DeliveryStatus::Sent));
        Ok(records)
    }

    async fn terminal(&self, key: &TrackingKey) -> Result<Option<DeliveryRecord>> {
        let path = self.key_dir(key).join(TERMINAL);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (record, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(Some(record))
    }
}
