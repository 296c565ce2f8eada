//! Process spawning and supervision.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::ManagedApplication;
use crate::error::{Error, Result};

/// Represents a running managed process.
///
/// Dropping the handle requests shutdown of the process in the background.
/// Call [`shutdown`](ManagedProcess::shutdown) to wait for it.
pub struct ManagedProcess {
    /// The application this process was launched from
    application: Arc<dyn ManagedApplication>,

    /// Exit status, set once by the monitor task
    exit_status: watch::Receiver<Option<ExitStatus>>,

    /// Application name
    name: String,

    /// Process ID
    pid: u32,

    /// Shutdown token to request termination
    shutdown_token: CancellationToken,

    /// Task tracker for all tasks associated with this process
    task_tracker: TaskTracker,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status())
            .finish_non_exhaustive()
    }
}

impl ManagedProcess {
    /// Returns the application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the exit status if the process has exited.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_status.borrow()
    }

    /// Returns whether the process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Waits for the process to exit.
    ///
    /// Returns `None` if the exit status could not be collected.
    pub async fn wait(&self) -> Option<ExitStatus> {
        let mut exit_status = self.exit_status.clone();

        exit_status
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|status| *status)
    }

    /// Shuts down the process and waits for its output to drain.
    ///
    /// Safe to call more than once, and after the process has exited.
    pub async fn shutdown(&self) -> Option<ExitStatus> {
        if self.is_running() {
            info!("shutting down {}...", self.name);
        }

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        debug!("{} shut down", self.name);

        self.exit_status()
    }

    /// Polls the application's readiness check until it passes.
    ///
    /// # Errors
    ///
    /// Returns an error if the process exits first or the readiness check
    /// fails `is_ready_check_max` times. The process is left running in the
    /// latter case.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let interval = Duration::from_millis(self.application.is_ready_check_interval_ms());
        let mut attempts = 0;

        loop {
            if let Some(status) = self.exit_status() {
                return Err(Error::ExitedBeforeReady(self.name.clone(), status));
            }

            if self.application.is_ready_check().await {
                debug!("{} is ready after {} failed checks", self.name, attempts);
                return Ok(());
            }

            attempts += 1;

            if self
                .application
                .is_ready_check_max()
                .is_some_and(|max| attempts >= max)
            {
                return Err(Error::NeverReady(self.name.clone(), attempts));
            }

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                status = self.wait() => {
                    if status.is_none() {
                        return Err(Error::Wait(self.name.clone()));
                    }
                }
            }
        }
    }

    /// Waits for the process to finish and its output to drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the process exits with a non-zero status or its
    /// exit status could not be collected.
    pub async fn wait_for_success(&self) -> Result<ExitStatus> {
        let status = self.wait().await;
        self.shutdown().await;

        match status {
            Some(status) if status.success() => Ok(status),
            Some(status) => Err(Error::ProcessExit(status)),
            None => Err(Error::Wait(self.name.clone())),
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if self.is_running() {
            debug!("{} handle dropped while running, stopping it", self.name);
        }

        self.shutdown_token.cancel();
    }
}

/// Spawns the application and waits until its readiness check passes.
///
/// # Errors
///
/// Returns an error if the process could not be spawned, exits before it is
/// ready, or runs out of readiness checks. The process is shut down in the
/// latter two cases.
pub async fn spawn<A: ManagedApplication>(application: A) -> Result<ManagedProcess> {
    let process = start(application)?;

    if let Err(e) = process.wait_until_ready().await {
        process.shutdown().await;

        return Err(e);
    }

    Ok(process)
}

/// Launches the application without waiting for it to become ready.
///
/// The child gets its own process group, so terminal signals only reach it
/// through [`ManagedProcess::shutdown`].
///
/// # Errors
///
/// Returns an error if the process could not be spawned.
pub fn start<A: ManagedApplication>(application: A) -> Result<ManagedProcess> {
    spawn_process(Arc::new(application))
}

/// Runs the application to completion.
///
/// # Errors
///
/// Returns an error if the process could not be spawned or exits with a
/// non-zero status.
pub async fn run<A: ManagedApplication>(application: A) -> Result<ExitStatus> {
    start(application)?.wait_for_success().await
}

fn spawn_process(application: Arc<dyn ManagedApplication>) -> Result<ManagedProcess> {
    let mut cmd = Command::new(application.executable());
    cmd.args(application.args());

    if let Some(working_dir) = application.working_dir() {
        cmd.current_dir(working_dir);
    }

    for (key, value) in application.env() {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    debug!("spawning process: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Io("failed to spawn process", e))?;

    let pid = child.id().ok_or_else(|| {
        Error::SpawnProcess("no pid available for spawned process".to_string())
    })?;

    debug!("{} spawned with pid {}", application.name(), pid);

    let shutdown_token = CancellationToken::new();
    let task_tracker = TaskTracker::new();
    let (status_tx, status_rx) = watch::channel(None);

    if let Some(stdout) = child.stdout.take() {
        let application = Arc::clone(&application);
        task_tracker.spawn(forward_lines(stdout, move |line| {
            application.handle_stdout(line);
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        let application = Arc::clone(&application);
        task_tracker.spawn(forward_lines(stderr, move |line| {
            application.handle_stderr(line);
        }));
    }

    task_tracker.spawn(monitor(
        child,
        pid,
        Arc::clone(&application),
        shutdown_token.clone(),
        status_tx,
    ));

    task_tracker.close();

    Ok(ManagedProcess {
        name: application.name().to_string(),
        application,
        exit_status: status_rx,
        pid,
        shutdown_token,
        task_tracker,
    })
}

async fn forward_lines<R, F>(reader: R, handle: F)
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(&str) + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    // Decode lossily: stopping on a bad byte would leave the pipe undrained
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                handle(line.trim_end_matches(['\n', '\r']));
            }
            Err(err) => {
                warn!("failed to read process output: {}", err);
                break;
            }
        }
    }
}

async fn monitor(
    mut child: Child,
    pid: u32,
    application: Arc<dyn ManagedApplication>,
    shutdown_token: CancellationToken,
    status_tx: watch::Sender<Option<ExitStatus>>,
) {
    let result = tokio::select! {
        status = child.wait() => status,
        () = shutdown_token.cancelled() => {
            info!("shutdown requested, stopping {}...", application.name());

            terminate(
                &mut child,
                pid,
                application.shutdown_signal(),
                application.shutdown_timeout(),
            )
            .await
        }
    };

    match result {
        Ok(status) => {
            if status.success() {
                info!("{} exited with status: {}", application.name(), status);
            } else {
                warn!("{} exited with non-zero status: {}", application.name(), status);
            }

            status_tx.send_replace(Some(status));
        }
        Err(err) => {
            error!("failed to wait for {}: {}", application.name(), err);
        }
    }
}

async fn terminate(
    child: &mut Child,
    pid: u32,
    signal: Signal,
    timeout: Duration,
) -> std::io::Result<ExitStatus> {
    match i32::try_from(pid) {
        Ok(raw_pid) => {
            if let Err(err) = signal::kill(Pid::from_raw(raw_pid), signal) {
                error!("failed to send {:?} to process {}: {}", signal, pid, err);
            }
        }
        Err(_) => error!("pid {} does not fit a signal target", pid),
    }

    if let Ok(result) = tokio::time::timeout(timeout, child.wait()).await {
        return result;
    }

    error!("timeout waiting for process {} to exit, killing...", pid);
    child.kill().await?;
    child.wait().await
}
