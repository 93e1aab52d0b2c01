//! Cryptographic envelope for credvault.
//!
//! This module provides:
//! - Decoding of SSH-formatted RSA public keys
//! - Lazily unlocked, passphrase-protected PEM private key containers
//! - RSA-OAEP encryption of record payloads under a fixed label
//!
//! # Security Guarantees
//! - Private keys are unlocked per decrypt call and zeroized on drop
//! - No plaintext, passphrase or key material is ever logged
//! - Decrypted payloads are returned in zeroizing buffers

pub mod container;
pub mod envelope;
pub mod public_key;

pub use container::{ContainerFormat, PrivateContainer};
pub use envelope::{decrypt, encrypt, max_plaintext_len, Envelope, OAEP_LABEL};
pub use public_key::PublicKey;

#[cfg(test)]
pub(crate) mod test_keys;
