//! Record storage for credvault.
//!
//! A record store maps a (type, name) pair to an opaque encrypted blob. The
//! store never interprets the blob.
//!
//! # Design Principles
//! - One record per key; writing again overwrites
//! - Each write stands alone; there are no multi-record transactions
//! - Enumeration surfaces corruption instead of skipping it

pub mod filter;
pub mod local;
pub mod memory;
pub mod store;

pub use filter::NameFilter;
pub use local::DirectoryStore;
pub use memory::MemoryStore;
pub use store::RecordStore;
