//! Time-bounded exposure of files through a [`Mounter`].

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::files::MountFiles;
use crate::mounter::Mounter;
use credvault_common::Result;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Mounted,
    TimedOut,
    Interrupted,
    UnmountRequested,
    Unmounted,
}

/// Event that ended the mounted phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The deadline elapsed.
    TimedOut,
    /// The caller cancelled, e.g. on Ctrl+C.
    Interrupted,
    /// The filesystem was unmounted from outside.
    UnmountRequested,
}

impl ExitReason {
    fn state(self) -> SessionState {
        match self {
            ExitReason::TimedOut => SessionState::TimedOut,
            ExitReason::Interrupted => SessionState::Interrupted,
            ExitReason::UnmountRequested => SessionState::UnmountRequested,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TimedOut => write!(f, "Time's up..."),
            ExitReason::Interrupted => write!(f, "Interrupted, stopped..."),
            ExitReason::UnmountRequested => write!(f, "Unmounted externally, stopped..."),
        }
    }
}

/// One mount of decrypted files with a deadline.
pub struct ExposureSession<W: Write + Send> {
    target: PathBuf,
    timeout: Duration,
    countdown: W,
    state: SessionState,
}

impl<W: Write + Send> ExposureSession<W> {
    /// Prepare a session; nothing is mounted until [`run`](Self::run).
    ///
    /// `countdown` receives a `\rHH:MM:SS` line every second and the exit
    /// message.
    pub fn new(target: impl AsRef<Path>, timeout: Duration, countdown: W) -> Self {
        Self {
            target: target.as_ref().to_path_buf(),
            timeout,
            countdown,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mount `files`, wait for the first exit event, then tear down.
    ///
    /// # Postconditions
    /// - Unmount was attempted exactly once if the mount succeeded
    /// - The state is `Unmounted` unless mounting itself failed
    /// - `files` have been released
    ///
    /// # Errors
    /// - `Mount` if the files could not be mounted; the state stays `Idle`
    /// - `Unmount` if teardown reported a failure; teardown still ran
    pub async fn run(
        &mut self,
        mounter: &dyn Mounter,
        files: MountFiles,
        cancel: CancellationToken,
    ) -> Result<ExitReason> {
        let count = files.len();
        let mut handle = mounter.mount(&self.target, files).await?;
        self.state = SessionState::Mounted;
        info!(
            mountpoint = %self.target.display(),
            files = count,
            timeout_secs = self.timeout.as_secs(),
            "Credentials mounted"
        );

        let deadline = Instant::now() + self.timeout;
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break ExitReason::Interrupted,
                _ = sleep_until(deadline) => break ExitReason::TimedOut,
                _ = handle.detached() => break ExitReason::UnmountRequested,
                _ = ticker.tick() => self.draw_countdown(deadline),
            }
        };
        self.state = reason.state();
        self.write_line(&reason.to_string());
        debug!(?reason, "Leaving mounted state");

        let unmounted = handle.unmount().await;
        self.state = SessionState::Unmounted;

        match &unmounted {
            Ok(()) => info!(mountpoint = %self.target.display(), "Credentials unmounted"),
            Err(e) => error!(
                mountpoint = %self.target.display(),
                error = %e,
                "Unmount reported an error"
            ),
        }
        unmounted.map(|()| reason)
    }

    fn draw_countdown(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        let drawn = write!(
            self.countdown,
            "\r{:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )
        .and_then(|()| self.countdown.flush());
        if let Err(e) = drawn {
            debug!(error = %e, "Countdown could not be written");
        }
    }

    fn write_line(&mut self, message: &str) {
        if let Err(e) = writeln!(self.countdown, "\n{}", message) {
            debug!(error = %e, "Countdown could not be written");
        }
    }
}
