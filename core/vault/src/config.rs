//! User settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use credvault_common::{Error, Result};

/// Default mount lifetime in seconds.
pub const DEFAULT_MOUNT_TIMEOUT: u64 = 120;

/// Settings loaded from the YAML config file.
///
/// Every path field has `~`, `$VAR` and `${VAR}` expanded after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding the encrypted records.
    pub store_path: PathBuf,
    /// Where `mount` exposes decrypted files.
    pub mountpoint: PathBuf,
    /// Seconds a mount stays up.
    pub mount_timeout: u64,
    /// Enable debug logging.
    pub debug: bool,
    /// PEM private key.
    pub private_key: PathBuf,
    /// OpenSSH public key.
    pub public_key: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("~/.credvault/store"),
            mountpoint: PathBuf::from("~/.credvault/mnt"),
            mount_timeout: DEFAULT_MOUNT_TIMEOUT,
            debug: false,
            private_key: PathBuf::from("~/.ssh/id_rsa"),
            public_key: PathBuf::from("~/.ssh/id_rsa.pub"),
        }
    }
}

impl Settings {
    /// `$HOME/.config/credvault/config.yml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("credvault").join("config.yml"))
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// - `Io` if the file exists but cannot be read
    /// - `Serialization` if the file is not valid settings YAML
    pub fn load(path: &Path) -> Result<Self> {
        let settings = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_yaml(&text).map_err(|e| match e {
                Error::Serialization(msg) => Error::Serialization(format!(
                    "Could not read settings from {}: {}",
                    path.display(),
                    msg
                )),
                other => other,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(settings.resolved(|name| std::env::var(name).ok()))
    }

    /// Parse settings YAML without expanding paths.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Expand every path field with `lookup` resolving variables.
    pub fn resolved(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for path in [
            &mut self.store_path,
            &mut self.mountpoint,
            &mut self.private_key,
            &mut self.public_key,
        ] {
            *path = PathBuf::from(expand(&path.to_string_lossy(), &lookup));
        }
        self
    }
}

/// Expand a leading `~` to `$HOME`, then `$VAR` and `${VAR}`.
///
/// Unset variables expand to the empty string.
pub fn expand(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    shellexpand::full_with_context_no_errors(
        raw,
        || lookup("HOME"),
        |name| Some(lookup(name).unwrap_or_default()),
    )
    .into_owned()
}
