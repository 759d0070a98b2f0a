use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{FileQueueStore, MemoryQueueStore, QueueStore, Result};

/// Where the dispatch queue keeps its state
///
/// ```ron
/// queue: File(path: "/var/spool/zenith/queue"),
/// ```
///
/// or, for local runs where nothing needs to survive a restart,
///
/// ```ron
/// queue: Memory,
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum QueueConfig {
    File { path: PathBuf },
    Memory,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::File {
            path: FileQueueStore::default().path().to_path_buf(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Build and initialise the configured store
    ///
    /// # Errors
    /// If the file store path is invalid or cannot be prepared
    pub fn open(&self) -> Result<Arc<dyn QueueStore>> {
        match self {
            Self::File { path } => {
                let store = FileQueueStore::new(path.clone())?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(MemoryQueueStore::new())),
        }
    }
}
