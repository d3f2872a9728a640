//! Child-process descriptors.
//!
//! A [`ProcessDescriptor`] is a fully configured, not-yet-started child
//! process: program, arguments, platform creation attributes and the
//! caller's cancellation token.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Linux `ETXTBSY`.
#[cfg(target_os = "linux")]
const ETXTBSY: i32 = 26;

/// Spawn attempts before a busy executable is reported as an error.
#[cfg(target_os = "linux")]
const SPAWN_BUSY_RETRIES: u32 = 5;

/// How long a cancelled process group gets to exit on SIGTERM.
#[cfg(unix)]
const GROUP_TERM_GRACE: Duration = Duration::from_millis(500);

/// Platform-specific process creation attributes.
///
/// Both fields exist on every platform so adapters can be written and
/// tested uniformly; each is only honoured where the OS supports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreationAttributes {
    /// Windows process creation flags (e.g. `CREATE_NO_WINDOW`).
    pub creation_flags: u32,
    /// Unix: make the child the leader of a new process group.
    pub new_process_group: bool,
}

/// A configured child process, not yet started.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    attributes: CreationAttributes,
    cancel: CancellationToken,
}

impl ProcessDescriptor {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
            envs: Vec::new(),
            attributes: CreationAttributes::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Binds the descriptor to `token`; [`run`](Self::run) kills the child
    /// when it is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn attributes(&self) -> &CreationAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut CreationAttributes {
        &mut self.attributes
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Builds a tokio command. Arguments are passed through unmodified.
    ///
    /// The child is killed if its [`Child`] handle is dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        #[cfg(windows)]
        if self.attributes.creation_flags != 0 {
            cmd.creation_flags(self.attributes.creation_flags);
        }

        #[cfg(unix)]
        if self.attributes.new_process_group {
            cmd.process_group(0);
        }

        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Starts the child process.
    ///
    /// Blocks briefly between attempts if the executable is busy; async
    /// callers should use [`run`](Self::run), which retries without blocking.
    pub fn spawn(&self) -> Result<Child> {
        let mut attempt = 0;
        let child = loop {
            match self.command().spawn() {
                Ok(child) => break child,
                Err(e) if should_retry(&e, attempt) => {
                    attempt += 1;
                    self.log_busy(attempt);
                    std::thread::sleep(busy_delay(attempt));
                }
                Err(source) => return Err(self.spawn_error(source)),
            }
        };

        self.log_spawned(&child);
        Ok(child)
    }

    async fn spawn_async(&self) -> Result<Child> {
        let mut attempt = 0;
        let child = loop {
            match self.command().spawn() {
                Ok(child) => break child,
                Err(e) if should_retry(&e, attempt) => {
                    attempt += 1;
                    self.log_busy(attempt);
                    tokio::time::sleep(busy_delay(attempt)).await;
                }
                Err(source) => return Err(self.spawn_error(source)),
            }
        };

        self.log_spawned(&child);
        Ok(child)
    }

    fn log_busy(&self, attempt: u32) {
        debug!(
            program = %self.program.display(),
            attempt,
            "Executable busy, retrying spawn"
        );
    }

    fn log_spawned(&self, child: &Child) {
        info!(
            program = %self.program.display(),
            pid = ?child.id(),
            args = ?self.args,
            "Spawned process"
        );
    }

    fn spawn_error(&self, source: io::Error) -> Error {
        Error::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Spawns the child and waits for it to exit, killing it if the
    /// cancellation token fires first.
    ///
    /// On cancellation the child has fully exited when this returns. If it
    /// leads its own process group, the whole group is terminated so nothing
    /// it started keeps running from the workspace.
    pub async fn run(&self) -> Result<ExitStatus> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let mut child = self.spawn_async().await?;

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = self.cancel.cancelled() => None,
        };

        match status {
            Some(status) => {
                let status =
                    status.map_err(|e| Error::io("Failed to wait for process", &self.program, e))?;
                debug!(program = %self.program.display(), %status, "Process exited");
                Ok(status)
            }
            None => {
                info!(program = %self.program.display(), "Cancelled, killing process");
                self.terminate(&mut child).await;
                Err(self.cancelled())
            }
        }
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if self.attributes.new_process_group {
            if let Some(pid) = child.id() {
                terminate_group(pid, child).await;
            }
        }

        // The leader may already be reaped by the group shutdown.
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.kill().await {
            warn!("Failed to kill {}: {}", self.program.display(), e);
        }
    }

    fn cancelled(&self) -> Error {
        let tool = self
            .program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        Error::Cancelled { tool }
    }
}

/// Linux reports `ETXTBSY` when a just-written executable is still open for
/// writing in some process, typically a concurrent fork that has not reached
/// `exec` yet. It clears on its own.
#[cfg(target_os = "linux")]
fn should_retry(e: &io::Error, attempt: u32) -> bool {
    e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_BUSY_RETRIES
}

#[cfg(not(target_os = "linux"))]
fn should_retry(_e: &io::Error, _attempt: u32) -> bool {
    false
}

fn busy_delay(attempt: u32) -> Duration {
    Duration::from_millis(10 * u64::from(attempt))
}

/// SIGTERM to the group, a grace period for the leader, then SIGKILL to
/// whatever is left in the group.
#[cfg(unix)]
async fn terminate_group(pid: u32, child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let pgid = Pid::from_raw(raw);

    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => {
            debug!(pgid = raw, "Sent SIGTERM to process group");
            let _ = tokio::time::timeout(GROUP_TERM_GRACE, child.wait()).await;
        }
        Err(Errno::ESRCH) => return,
        Err(e) => warn!("Failed to send SIGTERM to process group {}: {}", raw, e),
    }

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => debug!(pgid = raw, "Sent SIGKILL to process group"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send SIGKILL to process group {}: {}", raw, e),
    }
}
