//! Abstract interface for a managed database node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod rows;

pub use rows::{Row, Rows};

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// No data directory has been created yet.
    Uninitialized,

    /// The data directory exists but no server is running.
    Initialized,

    /// The server process is running.
    Running,

    /// The server was started and has since stopped.
    Stopped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A database server instance whose data directory, configuration and
/// process are managed on behalf of the caller.
///
/// Methods are meant to be called in lifecycle order: [`init`](Node::init),
/// [`append_conf`](Node::append_conf), [`start`](Node::start), then any
/// number of [`execute`](Node::execute) calls, and finally
/// [`teardown`](Node::teardown).
#[async_trait]
pub trait Node
where
    Self: Send + Sync + 'static,
{
    /// Error type for node operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Human readable name of the node.
    fn name(&self) -> &str;

    /// Port the server listens on.
    fn port(&self) -> u16;

    /// Directory containing the server binaries.
    fn bin_dir(&self) -> &Path;

    /// Path of the server log file.
    fn log_path(&self) -> PathBuf;

    /// Process id of the running server.
    async fn pid(&self) -> Option<u32>;

    /// Current lifecycle state.
    async fn status(&self) -> NodeStatus;

    /// Creates the on-disk data directory.
    async fn init(&self) -> Result<(), Self::Error>;

    /// Appends `text` as a line to `file_name` inside the data directory.
    async fn append_conf(&self, file_name: &str, text: &str) -> Result<(), Self::Error>;

    /// Starts the server and waits until it accepts connections.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Runs an SQL statement and returns its result rows.
    async fn execute(&self, sql: &str) -> Result<Rows, Self::Error>;

    /// Waits for the server process to exit.
    async fn wait(&self);

    /// Stops the server and releases the node's resources.
    async fn teardown(&self) -> Result<(), Self::Error>;
}
