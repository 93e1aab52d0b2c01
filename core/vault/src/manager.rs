//! Wiring of settings, key pair, record store and credential registry.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::operations::VaultOperations;
use credvault_common::{Error, Result};
use credvault_credentials::{builtin_registry, CredentialRegistry};
use credvault_crypto::Envelope;
use credvault_storage::{DirectoryStore, RecordStore};

/// Opens vaults described by [`Settings`].
pub struct VaultManager {
    registry: Arc<CredentialRegistry>,
}

impl VaultManager {
    /// Create a new vault manager with the built-in credential types.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(builtin_registry()),
        }
    }

    /// Create with a custom registry.
    pub fn with_registry(registry: CredentialRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Get the credential registry.
    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    /// Load the key pair named by the settings.
    ///
    /// The private key stays encrypted until a decrypt needs it.
    ///
    /// # Errors
    /// - `NotFound` if either key file is missing
    /// - `Parse` if either key cannot be decoded
    pub fn load_envelope(&self, settings: &Settings) -> Result<Envelope> {
        let public_key = read_key_file(&settings.public_key, "public")?;
        let private_key = zeroize::Zeroizing::new(read_key_file(&settings.private_key, "private")?);
        let envelope = Envelope::from_bytes(&public_key, &private_key)?;

        debug!(
            public_key = %settings.public_key.display(),
            private_key = %settings.private_key.display(),
            protected = envelope.container().is_protected(),
            "Key pair loaded"
        );
        Ok(envelope)
    }

    /// Open the record store directory.
    ///
    /// # Errors
    /// - `NotFound` if the directory does not exist
    /// - `InvalidInput` if the path is not a directory
    pub fn open_store(&self, settings: &Settings) -> Result<Arc<dyn RecordStore>> {
        Ok(Arc::new(DirectoryStore::open(&settings.store_path)?))
    }

    /// Open the vault with its key pair, for operations that read or write
    /// record contents.
    pub fn open(&self, settings: &Settings) -> Result<VaultOperations> {
        let store = self.open_store(settings)?;
        let envelope = self.load_envelope(settings)?;
        Ok(VaultOperations::new(store, self.registry.clone()).with_envelope(envelope))
    }

    /// Open the vault without keys, for operations that only touch record
    /// names.
    pub fn open_without_keys(&self, settings: &Settings) -> Result<VaultOperations> {
        let store = self.open_store(settings)?;
        Ok(VaultOperations::new(store, self.registry.clone()))
    }
}

impl Default for VaultManager {
    fn default() -> Self {
        Self::new()
    }
}

fn read_key_file(path: &Path, which: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!(
            "{} key {} does not exist",
            which,
            path.display()
        )),
        _ => Error::Io(e),
    })
}
