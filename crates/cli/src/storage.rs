//! File backed host storage
//!
//! Keeps the interrupted backup and, when enabled, user code hashes across
//! CLI runs. Values are plain files under `$TANGEM_HOME` (default
//! `~/.tangem`), one per key.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tangem_sdk::{Error, Result, storage::SecureStorage};
use tracing::debug;

#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let root = match std::env::var_os("TANGEM_HOME") {
            Some(home) => PathBuf::from(home),
            None => std::env::var_os("HOME")
                .map(|home| Path::new(&home).join(".tangem"))
                .context("neither TANGEM_HOME nor HOME is set")?,
        };
        Self::open(root)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key))
    }
}

fn storage_error(error: io::Error) -> Error {
    Error::Underlying(format!("storage: {error}"))
}

impl SecureStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(storage_error(error)),
        }
    }

    fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        debug!(key, "Storing value");
        fs::write(self.path(key), value).map_err(storage_error)
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(storage_error(error)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let root = std::env::temp_dir().join(format!("tangem-cli-{}", std::process::id()));
        let storage = FileStorage::open(&root).unwrap();
        assert_eq!(storage.get("backup_session").unwrap(), None);

        storage.store("backup_session", b"{}").unwrap();
        let reopened = FileStorage::open(&root).unwrap();
        assert_eq!(reopened.get("backup_session").unwrap().as_deref(), Some(&b"{}"[..]));

        reopened.delete("backup_session").unwrap();
        reopened.delete("backup_session").unwrap();
        assert_eq!(storage.get("backup_session").unwrap(), None);
        fs::remove_dir_all(root).unwrap();
    }
}
