//! Virtual filesystem seam.

use async_trait::async_trait;
use std::path::Path;

use crate::files::MountFiles;
use credvault_common::Result;

/// Presents a set of files at a mount point.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount `files` at `target`.
    ///
    /// # Preconditions
    /// - `target` is an empty directory, or does not exist yet
    ///
    /// # Postconditions
    /// - Each file is readable by the owner only; the content is fixed
    /// - The mounter owns `files` until the handle is unmounted
    ///
    /// # Errors
    /// - `Mount` if the filesystem cannot be presented
    async fn mount(&self, target: &Path, files: MountFiles) -> Result<Box<dyn MountHandle>>;
}

/// A live mount.
#[async_trait]
pub trait MountHandle: Send {
    /// Where the files are presented.
    fn mount_point(&self) -> &Path;

    /// Resolves once the filesystem was unmounted by someone else.
    ///
    /// Never resolves while the mount is live. Must be cancel safe.
    async fn detached(&mut self);

    /// Tear the mount down and release the file contents.
    ///
    /// # Errors
    /// - `Unmount` if the teardown reported a failure
    async fn unmount(self: Box<Self>) -> Result<()>;
}
