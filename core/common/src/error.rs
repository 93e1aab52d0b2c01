//! Common error types for credvault.

use std::fmt;

use thiserror::Error;

/// Why a decryption attempt failed.
///
/// The two cases call for different reactions: a bad passphrase can be
/// retried after reprompting, a bad ciphertext means the record is damaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    /// The private key container could not be unlocked.
    BadPassphrase,
    /// The ciphertext failed the padding/label check or was truncated.
    BadCiphertext,
}

impl fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPassphrase => write!(f, "wrong passphrase or damaged private key"),
            Self::BadCiphertext => write!(f, "ciphertext is corrupted or was not produced for this key"),
        }
    }
}

/// Top-level error type for credvault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Malformed key material or record file name.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Decryption failed.
    #[error("Decryption failed: {0}")]
    Decrypt(DecryptFailure),

    /// Plaintext exceeds what the envelope can carry.
    #[error("Payload too large: {len} bytes, the key allows at most {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// No credential type is registered under this name.
    #[error("Credential type '{type_name}' does not exist, must be one of the following: {}", known.join(", "))]
    UnknownType { type_name: String, known: Vec<String> },

    /// A stored record does not match its type's schema.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream rotation failed; the stored record is untouched.
    #[error("Rotation failed: {0}")]
    Rotate(String),

    /// Upstream verification could not be performed.
    #[error("Verification failed: {0}")]
    Verify(String),

    /// Upstream rotation succeeded but the new secret could not be stored.
    ///
    /// The previous secret is already invalid upstream, so the local record
    /// is stale until it is fixed by hand.
    #[error("Credential '{name}' (type {type_name}) was rotated upstream but could not be saved locally: {reason}. The stored copy is stale")]
    RotationNotPersisted {
        name: String,
        type_name: String,
        reason: String,
    },

    /// The virtual filesystem could not be mounted.
    #[error("Mount error: {0}")]
    Mount(String),

    /// The virtual filesystem reported an error while unmounting.
    #[error("Unmount error: {0}")]
    Unmount(String),

    /// Network operation failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Interactive input could not be read.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether repeating the operation with new user input can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Decrypt(DecryptFailure::BadPassphrase))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
