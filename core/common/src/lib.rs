//! Common utilities and types shared across credvault modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{DecryptFailure, Error, Result};
pub use types::{RecordKey, SensitiveBytes, RECORD_SEPARATOR};
