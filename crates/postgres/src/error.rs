use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// The data directory is already populated.
    #[error("data directory {} already exists and is not empty", .0.display())]
    DataDirectoryExists(PathBuf),

    /// `initdb` failed.
    #[error("initdb failed: {0}")]
    InitDb(#[source] pgnode_process::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A required server binary is missing.
    #[error("{binary} not found in {}", .dir.display())]
    MissingBinary {
        /// Name of the binary.
        binary: &'static str,

        /// Directory that was searched.
        dir: PathBuf,
    },

    /// The data directory has not been initialized.
    #[error("data directory is not initialized")]
    NotInitialized,

    /// The server is not running.
    #[error("postgres is not running")]
    NotRunning,

    /// Another process is listening on the port.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// An SQL statement failed.
    #[error("query failed: {message} (sql: {sql})")]
    Query {
        /// The statement that failed.
        sql: String,

        /// The error reported by the server.
        message: String,
    },

    /// The server failed to start.
    #[error("failed to start postgres: {0}")]
    Startup(#[source] pgnode_process::Error),
}
