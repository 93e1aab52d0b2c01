//! FUSE mount management.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fuser::{MountOption, SessionUnmounter};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::filesystem::CredentialFilesystem;
use crate::files::MountFiles;
use crate::mounter::{MountHandle, Mounter};
use credvault_common::{Error, Result};

/// How long to wait for the FUSE thread after unmounting.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Mounts files through FUSE.
#[derive(Debug, Clone)]
pub struct FuseMounter {
    fs_name: String,
    debug: bool,
}

impl FuseMounter {
    /// Create a mounter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace every FUSE request the mounted filesystem serves.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for FuseMounter {
    fn default() -> Self {
        Self {
            fs_name: "credvault".to_string(),
            debug: false,
        }
    }
}

/// Create the mount point if needed and check it is an empty directory.
fn prepare_mount_point(mount_point: &Path) -> Result<()> {
    if !mount_point.exists() {
        std::fs::create_dir_all(mount_point)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(mount_point, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    if !mount_point.is_dir() {
        return Err(Error::Mount(format!(
            "Mount point is not a directory: {}",
            mount_point.display()
        )));
    }
    if std::fs::read_dir(mount_point)?.next().is_some() {
        return Err(Error::Mount(format!(
            "Mount point is not empty: {}",
            mount_point.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl Mounter for FuseMounter {
    async fn mount(&self, target: &Path, files: MountFiles) -> Result<Box<dyn MountHandle>> {
        let mount_point = target.to_path_buf();
        prepare_mount_point(&mount_point)?;

        info!(debug = self.debug, "Mounting credentials at {:?}", mount_point);

        let options = [
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype(self.fs_name.clone()),
            MountOption::RO,
            MountOption::NoExec,
            MountOption::NoSuid,
            MountOption::NoDev,
            MountOption::DefaultPermissions,
        ];

        let fs = CredentialFilesystem::new(files).with_debug(self.debug);
        let mut session = fuser::Session::new(fs, &mount_point, &options).map_err(|e| {
            error!("Failed to create FUSE session: {}", e);
            Error::Mount(format!("{}: {}", mount_point.display(), e))
        })?;
        let unmounter = session.unmount_callable();

        let (finished_tx, finished_rx) = oneshot::channel();
        thread::Builder::new()
            .name("credvault-fuse".to_string())
            .spawn(move || {
                let result = session.run();
                // Dropping the session releases the file contents
                drop(session);
                let _ = finished_tx.send(result);
            })
            .map_err(|e| Error::Mount(format!("Failed to start FUSE thread: {}", e)))?;

        Ok(Box::new(FuseHandle {
            mount_point,
            unmounter,
            finished: Some(finished_rx),
            finished_result: None,
        }))
    }
}

/// Handle to a mounted FUSE filesystem.
pub struct FuseHandle {
    mount_point: PathBuf,
    unmounter: SessionUnmounter,
    finished: Option<oneshot::Receiver<io::Result<()>>>,
    /// Set once the FUSE thread has exited on its own.
    finished_result: Option<io::Result<()>>,
}

#[async_trait]
impl MountHandle for FuseHandle {
    fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    async fn detached(&mut self) {
        match self.finished.as_mut() {
            Some(rx) => {
                let result = rx
                    .await
                    .unwrap_or_else(|_| Err(io::Error::other("FUSE thread exited")));
                self.finished = None;
                self.finished_result = Some(result);
            }
            None => std::future::pending::<()>().await,
        }
    }

    async fn unmount(mut self: Box<Self>) -> Result<()> {
        info!("Unmounting credentials from {:?}", self.mount_point);

        let result = match self.finished.take() {
            None => self.finished_result.take().unwrap_or(Ok(())),
            Some(rx) => {
                if let Err(e) = self.unmounter.unmount() {
                    return Err(Error::Unmount(format!(
                        "{}: {}",
                        self.mount_point.display(),
                        e
                    )));
                }
                match tokio::time::timeout(JOIN_TIMEOUT, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Ok(()),
                    Err(_) => {
                        warn!("FUSE thread did not stop within {:?}", JOIN_TIMEOUT);
                        Ok(())
                    }
                }
            }
        };

        result.map_err(|e| Error::Unmount(format!("{}: {}", self.mount_point.display(), e)))
    }
}

/// Check if FUSE is available on the system.
pub fn is_fuse_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }

    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        false
    }
}

/// Hint shown when mounting fails.
pub fn fuse_info() -> String {
    if is_fuse_available() {
        "FUSE is available".to_string()
    } else if cfg!(target_os = "macos") {
        "macFUSE is not installed".to_string()
    } else {
        "FUSE is not available; install the fuse3 package".to_string()
    }
}
