//! Error types for managed processes.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising a process.
#[derive(Debug, Error)]
pub enum Error {
    /// The process exited before its readiness check passed.
    #[error("{0} exited before becoming ready: {1}")]
    ExitedBeforeReady(String, ExitStatus),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// The readiness check kept failing.
    #[error("{0} not ready after {1} checks")]
    NeverReady(String, u32),

    /// Process exited with non-zero status
    #[error("Process exited with non-zero status: {0}")]
    ProcessExit(ExitStatus),

    /// Failed to spawn a process
    #[error("Failed to spawn process: {0}")]
    SpawnProcess(String),

    /// The exit status of the process could not be collected.
    #[error("failed to wait for {0}")]
    Wait(String),
}
