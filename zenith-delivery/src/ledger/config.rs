use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use super::{FileLedger, Ledger, MemoryLedger, Result};

/// Where delivery records are kept
///
/// ```ron
/// ledger: File(path: "/var/spool/zenith/ledger"),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum LedgerConfig {
    File { path: PathBuf },
    Memory,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::File {
            path: FileLedger::default().path().to_path_buf(),
        }
    }
}

impl LedgerConfig {
    /// Build and initialise the configured ledger
    ///
    /// # Errors
    /// If the file ledger path is invalid or cannot be prepared
    pub fn open(&self) -> Result<Arc<dyn Ledger>> {
        match self {
            Self::File { path } => {
                let ledger = FileLedger::new(path.clone())?;
                ledger.init()?;
                Ok(Arc::new(ledger))
            }
            Self::Memory => Ok(Arc::new(MemoryLedger::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        let file: LedgerConfig = ron::from_str(r#"File(path: "/srv/zenith/ledger")"#).unwrap();
        assert_eq!(
            file,
            LedgerConfig::File {
                path: PathBuf::from("/srv/zenith/ledger")
            }
        );
        assert_eq!(
            ron::from_str::<LedgerConfig>("Memory").unwrap(),
            LedgerConfig::Memory
        );
        assert_eq!(
            LedgerConfig::default(),
            LedgerConfig::File {
                path: PathBuf::from("/var/spool/zenith/ledger")
            }
        );
    }

    #[test]
    fn test_open_file_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::File {
            path: dir.path().join("ledger"),
        };
        config.open().unwrap();
        assert!(dir.path().join("ledger").is_dir());
    }
}
