//! Ephemeral exposure of decrypted credentials as files.
//!
//! An [`ExposureSession`] presents a fixed set of files at a mount point
//! until a deadline passes, the caller cancels, or the filesystem is
//! unmounted from outside. Whatever ends it, the filesystem is torn down
//! exactly once before `run` returns.
//!
//! # Feature Flags
//! - `fuse`: Enable FUSE support (requires libfuse3-dev on Linux or macFUSE on macOS)

pub mod files;
pub mod mounter;
pub mod session;

#[cfg(feature = "fuse")]
pub mod filesystem;

#[cfg(feature = "fuse")]
pub mod mount;

#[cfg(feature = "fuse")]
pub use filesystem::CredentialFilesystem;

pub use files::MountFiles;
pub use mount::{fuse_info, is_fuse_available, FuseMounter};
pub use mounter::{MountHandle, Mounter};
pub use session::{ExitReason, ExposureSession, SessionState};

/// Stub module for when FUSE is not available.
#[cfg(not(feature = "fuse"))]
pub mod mount {
    use async_trait::async_trait;
    use std::path::Path;

    use crate::files::MountFiles;
    use crate::mounter::{MountHandle, Mounter};
    use credvault_common::{Error, Result};

    /// FUSE mounter placeholder; every mount fails.
    #[derive(Debug, Clone, Default)]
    pub struct FuseMounter;

    impl FuseMounter {
        pub fn new() -> Self {
            Self
        }

        pub fn with_debug(self, _debug: bool) -> Self {
            self
        }
    }

    #[async_trait]
    impl Mounter for FuseMounter {
        async fn mount(&self, _target: &Path, _files: MountFiles) -> Result<Box<dyn MountHandle>> {
            Err(Error::Mount(fuse_info()))
        }
    }

    /// Check if FUSE is available (always false without feature).
    pub fn is_fuse_available() -> bool {
        false
    }

    /// Get FUSE info message.
    pub fn fuse_info() -> String {
        "FUSE support not compiled in. Rebuild with --features fuse".to_string()
    }
}
