//! The path to content mapping a session exposes.

use std::collections::BTreeMap;

use credvault_common::{Error, Result, SensitiveBytes};

/// Flat file names mapped to their decrypted contents.
///
/// Contents are zeroized when the mapping is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountFiles {
    files: BTreeMap<String, SensitiveBytes>,
}

impl MountFiles {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `contents` to the file at `path`, creating it if needed.
    ///
    /// Callers appending several credentials to one path control the
    /// resulting order.
    ///
    /// # Errors
    /// - `InvalidInput` if `path` is not a plain file name
    pub fn append(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        validate_file_name(path)?;
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(contents);
        Ok(())
    }

    /// Contents of one file.
    pub fn get(&self, path: &str) -> Option<&SensitiveBytes> {
        self.files.get(path)
    }

    /// Files in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensitiveBytes)> {
        self.files.iter().map(|(name, data)| (name.as_str(), data))
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether there is nothing to expose.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn validate_file_name(path: &str) -> Result<()> {
    if path.is_empty() || path == "." || path == ".." || path.contains('/') || path.contains('\0') {
        return Err(Error::InvalidInput(format!(
            "Mount path '{}' must be a plain file name",
            path
        )));
    }
    Ok(())
}
