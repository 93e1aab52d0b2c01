//! Vault engine for credvault.
//!
//! This module provides:
//! - Settings loading
//! - Wiring of the record store, key pair and credential registry
//! - The vault operations (add, list, show, edit, rotate, verify, mount, ...)
//!
//! # Architecture
//! The vault sits between the command line and the core crates. Plaintext
//! only exists between a decrypt and the end of the operation that needed it.

pub mod config;
pub mod manager;
pub mod operations;

pub use config::Settings;
pub use manager::VaultManager;
pub use operations::{Editor, EnvVars, MountCollection, Outcome, RecordOutcome, VaultOperations};
