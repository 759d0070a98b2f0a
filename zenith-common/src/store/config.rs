use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use super::{CampaignStore, FileStore, MemoryStore, Result, Seed, SubscriberStore};
use crate::internal;

/// Where campaigns and subscribers are kept
///
/// ```ron
/// backend: File(path: "/var/spool/zenith/store"),
/// ```
///
/// or, for local runs where campaign state may be lost on restart,
///
/// ```ron
/// backend: Memory,
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreBackend {
    File { path: PathBuf },
    Memory,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/spool/zenith/store"),
        }
    }
}

/// Both store halves, backed by the same rows
#[derive(Debug, Clone)]
pub struct Stores {
    pub campaigns: Arc<dyn CampaignStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
}

impl StoreBackend {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Open the configured store and add whatever `seed` holds that it does
    /// not
    ///
    /// # Errors
    /// If the file store path is invalid, or rows cannot be read or written
    pub async fn open(&self, seed: Seed) -> Result<Stores> {
        match self {
            Self::File { path } => {
                let store = FileStore::open(path.clone())?;
                let added = store.seed(seed).await?;
                if added > 0 {
                    internal!(level = INFO, "Seeded {added} new rows into {}", path.display());
                }

                Ok(Stores {
                    campaigns: Arc::new(store.clone()),
                    subscribers: Arc::new(store),
                })
            }
            Self::Memory => {
                let store = MemoryStore::from_seed(seed);
                Ok(Stores {
                    campaigns: Arc::new(store.clone()),
                    subscribers: Arc::new(store),
                })
            }
        }
    }
}
