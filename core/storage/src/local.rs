//! Directory-backed record store.
//!
//! Each record is one file named `<type>@<name>` holding the raw ciphertext.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::filter::NameFilter;
use crate::store::RecordStore;
use credvault_common::{Error, RecordKey, Result};

/// Permission bits for record files.
#[cfg(unix)]
const RECORD_MODE: u32 = 0o600;

/// Record store over a flat directory of files.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open an existing store directory.
    ///
    /// # Preconditions
    /// - `root` exists and is a directory
    ///
    /// # Errors
    /// - `NotFound` if the path does not exist
    /// - `InvalidInput` if the path is not a directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let meta = match std::fs::metadata(&root) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Store directory not found: {}",
                    root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Store path is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    /// The store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    async fn create_private_file(path: &Path) -> Result<fs::File> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(RECORD_MODE);
        Ok(options.open(path).await?)
    }
}

#[async_trait]
impl RecordStore for DirectoryStore {
    fn name(&self) -> &str {
        "directory"
    }

    async fn list(&self, filters: &[String]) -> Result<Vec<RecordKey>> {
        let filter = NameFilter::new(filters)?;

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            let file_name = file_name.to_str().ok_or_else(|| {
                Error::Parse(format!(
                    "Record file name is not valid UTF-8: {}",
                    entry.path().display()
                ))
            })?;
            if file_name.starts_with('.') {
                continue;
            }

            let key = RecordKey::from_file_name(file_name).map_err(|e| match e {
                Error::InvalidInput(msg) => {
                    Error::Parse(format!("Malformed record file '{}': {}", file_name, msg))
                }
                other => other,
            })?;
            if filter.matches(key.name()) {
                results.push(key);
            }
        }

        results.sort();
        debug!(count = results.len(), "Listed records");
        Ok(results)
    }

    async fn read(&self, key: &RecordKey) -> Result<Vec<u8>> {
        let path = self.record_path(key);

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Credential {} not found", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &RecordKey, data: &[u8]) -> Result<()> {
        let path = self.record_path(key);
        let temp_path = self.root.join(format!(".{}.{}.tmp", key.file_name(), Uuid::new_v4()));

        let written = async {
            let mut file = Self::create_private_file(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await?;
            Ok::<_, Error>(())
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        written?;

        debug!(record = %key, size = data.len(), "Record written");
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        let path = self.record_path(key);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(record = %key, "Record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Credential {} not found", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &RecordKey) -> Result<bool> {
        Ok(fs::try_exists(self.record_path(key)).await?)
    }
}
