use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tracing::{info, warn};

/// An application that runs as a supervised child process.
#[async_trait]
pub trait ManagedApplication: Send + Sync + 'static {
    /// Arguments passed to the executable.
    fn args(&self) -> Vec<String>;

    /// Extra environment variables for the process.
    fn env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Path of the executable to run.
    fn executable(&self) -> PathBuf;

    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Called for every line the process writes to stdout.
    fn handle_stdout(&self, line: &str) {
        info!(app = self.name(), "{}", line);
    }

    /// Called for every line the process writes to stderr.
    fn handle_stderr(&self, line: &str) {
        warn!(app = self.name(), "{}", line);
    }

    /// Returns `true` once the application is ready to accept work.
    async fn is_ready_check(&self) -> bool {
        true
    }

    /// Delay between readiness checks.
    fn is_ready_check_interval_ms(&self) -> u64 {
        1000
    }

    /// Maximum number of readiness checks. `None` keeps checking until the
    /// process exits.
    fn is_ready_check_max(&self) -> Option<u32> {
        None
    }

    /// Signal sent to request a graceful stop.
    fn shutdown_signal(&self) -> Signal {
        Signal::SIGTERM
    }

    /// How long to wait after the shutdown signal before killing the process.
    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Working directory for the process.
    fn working_dir(&self) -> Option<PathBuf> {
        None
    }
}
