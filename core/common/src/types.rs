//! Common types used throughout credvault.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Separator between the type and the name in a stored record's file name.
pub const RECORD_SEPARATOR: char = '@';

/// Identity of a stored record: which credential type owns it and its label.
///
/// The storage key is `<type><RECORD_SEPARATOR><name>`, so neither part may
/// contain the separator. Keys order by name first, then type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    name: String,
    type_name: String,
}

impl RecordKey {
    /// Create a record key from a type name and a record name.
    ///
    /// # Preconditions
    /// - `type_name` is non-empty and made of ASCII alphanumerics or `-`
    /// - `name` is non-empty, does not start with `.` and contains neither
    ///   the separator, `/` nor NUL
    ///
    /// # Errors
    /// - Returns `InvalidInput` if either part is invalid
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> crate::Result<Self> {
        let type_name = type_name.into();
        let name = name.into();
        validate_type_name(&type_name)?;
        validate_name(&name)?;
        Ok(Self { name, type_name })
    }

    /// Split a stored file name back into its key.
    ///
    /// # Errors
    /// - Returns `Parse` if the separator is missing
    /// - Returns `InvalidInput` if either part is invalid
    pub fn from_file_name(file_name: &str) -> crate::Result<Self> {
        let (type_name, name) = file_name.split_once(RECORD_SEPARATOR).ok_or_else(|| {
            crate::Error::Parse(format!(
                "record file '{}' lacks the '{}' separator",
                file_name, RECORD_SEPARATOR
            ))
        })?;
        Self::new(type_name, name)
    }

    /// The credential type owning this record.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The user-chosen label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file name used by directory-backed stores.
    pub fn file_name(&self) -> String {
        format!("{}{}{}", self.type_name, RECORD_SEPARATOR, self.name)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (type {})", self.name, self.type_name)
    }
}

/// Check a credential type name.
pub fn validate_type_name(type_name: &str) -> crate::Result<()> {
    if type_name.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Credential type name cannot be empty".to_string(),
        ));
    }
    if !type_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(crate::Error::InvalidInput(format!(
            "Credential type name '{}' may only contain ASCII letters, digits and '-'",
            type_name
        )));
    }
    Ok(())
}

/// Check a record name.
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Credential name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('.') {
        return Err(crate::Error::InvalidInput(format!(
            "Credential name '{}' cannot start with '.'",
            name
        )));
    }
    if name.contains(RECORD_SEPARATOR) || name.contains('/') || name.contains('\0') {
        return Err(crate::Error::InvalidInput(format!(
            "Credential name '{}' cannot contain '{}', '/' or NUL",
            name, RECORD_SEPARATOR
        )));
    }
    Ok(())
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append more bytes; the old allocation is scrubbed if it has to grow.
    pub fn extend_from_slice(&mut self, more: &[u8]) {
        if self.0.capacity() - self.0.len() < more.len() {
            let mut grown = Vec::with_capacity((self.0.len() + more.len()).max(self.0.capacity() * 2));
            grown.extend_from_slice(&self.0);
            self.0.zeroize();
            self.0 = grown;
        }
        self.0.extend_from_slice(more);
    }
}

impl From<Vec<u8>> for SensitiveBytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<String> for SensitiveBytes {
    fn from(data: String) -> Self {
        Self(data.into_bytes())
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
