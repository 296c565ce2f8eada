//! Configures and runs a throwaway Postgres server for local testing.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod apps;
mod error;
mod psql;

pub use error::Error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pgnode_node::{Node, NodeStatus, Rows};
use pgnode_process::ManagedProcess;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::apps::{InitDbApp, PostgresApp};

/// Address the server listens on and clients connect to.
pub(crate) const LISTEN_ADDRESS: &str = "127.0.0.1";

/// Main server configuration file.
pub const CONF_FILE: &str = "postgresql.conf";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;

/// Runs a Postgres server out of a private base directory.
///
/// The base directory holds `data/` and `logs/postgresql.log`. A temporary
/// base directory is removed again on [`teardown`](Node::teardown) unless
/// `keep_data` is set.
pub struct Postgres {
    base_dir: PathBuf,
    bin_dir: PathBuf,
    initdb: Mutex<Option<Arc<ManagedProcess>>>,
    keep_data: bool,
    name: String,
    port: u16,
    process: Mutex<Option<Arc<ManagedProcess>>>,
    startup_timeout: Duration,
    stopped: AtomicBool,
    temp_dir: parking_lot::Mutex<Option<TempDir>>,
    username: String,
}

/// Options for configuring `Postgres`.
#[derive(Clone, Debug)]
pub struct PostgresOptions {
    /// Directory for data and logs. A temporary directory is used if `None`.
    pub base_dir: Option<PathBuf>,

    /// Directory containing `initdb`, `postgres`, `pg_isready` and `psql`.
    pub bin_dir: PathBuf,

    /// Keep a temporary base directory after teardown.
    pub keep_data: bool,

    /// Node name. Generated if `None`.
    pub name: Option<String>,

    /// The port to run Postgres on.
    pub port: u16,

    /// How long to wait for the server to accept connections.
    pub startup_timeout: Duration,

    /// The superuser created by `initdb`.
    pub username: String,
}

impl PostgresOptions {
    /// Creates options with defaults for everything except the binary directory.
    #[must_use]
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: None,
            bin_dir: bin_dir.into(),
            keep_data: false,
            name: None,
            port: DEFAULT_PORT,
            startup_timeout: Duration::from_secs(30),
            username: "postgres".to_string(),
        }
    }
}

impl Postgres {
    /// Creates a new instance of `Postgres`. Nothing is written to disk until
    /// [`init`](Node::init).
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary base directory cannot be created.
    pub fn new(
        PostgresOptions {
            base_dir,
            bin_dir,
            keep_data,
            name,
            port,
            startup_timeout,
            username,
        }: PostgresOptions,
    ) -> Result<Self, Error> {
        let (base_dir, temp_dir) = match base_dir {
            Some(base_dir) => (base_dir, None),
            None => {
                let temp_dir = tempfile::Builder::new()
                    .prefix("pgnode-")
                    .tempdir()
                    .map_err(|e| Error::Io("failed to create temporary directory", e))?;

                (temp_dir.path().to_path_buf(), Some(temp_dir))
            }
        };

        let name = name.unwrap_or_else(|| format!("pgnode-{}", Uuid::new_v4().simple()));

        debug!("node {} uses base directory {}", name, base_dir.display());

        Ok(Self {
            base_dir,
            bin_dir,
            initdb: Mutex::new(None),
            keep_data,
            name,
            port,
            process: Mutex::new(None),
            startup_timeout,
            stopped: AtomicBool::new(false),
            temp_dir: parking_lot::Mutex::new(temp_dir),
            username,
        })
    }

    /// Returns the base directory of the node.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the data directory of the node.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Returns the superuser name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    // check if the database is initialized
    fn is_initialized(&self) -> bool {
        self.data_dir().join("PG_VERSION").exists()
    }

    fn require_binary(&self, binary: &'static str) -> Result<(), Error> {
        if self.bin_dir.join(binary).is_file() {
            Ok(())
        } else {
            Err(Error::MissingBinary {
                binary,
                dir: self.bin_dir.clone(),
            })
        }
    }

    fn default_conf(&self) -> String {
        format!(
            "\n# pgnode defaults\n\
             listen_addresses = '{LISTEN_ADDRESS}'\n\
             port = {}\n\
             unix_socket_directories = ''\n\
             fsync = off\n\
             full_page_writes = off\n\
             log_statement = 'all'\n\
             log_line_prefix = '%m [%p] '\n\
             log_timezone = 'UTC'",
            self.port
        )
    }

    async fn running_process(&self) -> Option<Arc<ManagedProcess>> {
        self.process
            .lock()
            .await
            .as_ref()
            .filter(|process| process.is_running())
            .cloned()
    }
}

impl std::fmt::Debug for Postgres {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postgres")
            .field("name", &self.name)
            .field("base_dir", &self.base_dir)
            .field("bin_dir", &self.bin_dir)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

async fn is_non_empty_dir(path: &Path) -> Result<bool, Error> {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => Ok(entries
            .next_entry()
            .await
            .map_err(|e| Error::Io("failed to read data directory", e))?
            .is_some()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io("failed to read data directory", e)),
    }
}

async fn ensure_port_free(port: u16) -> Result<(), Error> {
    match TcpListener::bind((LISTEN_ADDRESS, port)).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AddrInUse => Err(Error::PortInUse(port)),
        Err(e) => Err(Error::Io("failed to probe port", e)),
    }
}

#[async_trait]
impl Node for Postgres {
    type Error = Error;

    fn name(&self) -> &str {
        &self.name
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    fn log_path(&self) -> PathBuf {
        self.log_dir().join("postgresql.log")
    }

    async fn pid(&self) -> Option<u32> {
        self.running_process().await.map(|process| process.pid())
    }

    async fn status(&self) -> NodeStatus {
        if self.running_process().await.is_some() {
            NodeStatus::Running
        } else if self.stopped.load(Ordering::SeqCst) || self.process.lock().await.is_some() {
            NodeStatus::Stopped
        } else if self.is_initialized() {
            NodeStatus::Initialized
        } else {
            NodeStatus::Uninitialized
        }
    }

    /// Creates the data directory with `initdb` and writes the defaults
    /// pgnode relies on to `postgresql.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if `initdb` is missing or fails, or if the data
    /// directory already holds files.
    async fn init(&self) -> Result<(), Error> {
        self.require_binary("initdb")?;

        let data_dir = self.data_dir();
        if is_non_empty_dir(&data_dir).await? {
            return Err(Error::DataDirectoryExists(data_dir));
        }

        tokio::fs::create_dir_all(self.log_dir())
            .await
            .map_err(|e| Error::Io("failed to create log directory", e))?;

        info!("initializing database...");

        // Teardown stops an initdb left behind by an abandoned init
        let initdb = Arc::new(
            pgnode_process::start(InitDbApp {
                bin_dir: self.bin_dir.clone(),
                data_dir,
                username: self.username.clone(),
            })
            .map_err(Error::InitDb)?,
        );
        self.initdb.lock().await.replace(Arc::clone(&initdb));

        let result = initdb.wait_for_success().await;
        self.initdb.lock().await.take();
        result.map_err(Error::InitDb)?;

        self.append_conf(CONF_FILE, &self.default_conf()).await?;

        info!("database initialized");

        Ok(())
    }

    async fn append_conf(&self, file_name: &str, text: &str) -> Result<(), Error> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        if self.running_process().await.is_some() {
            warn!("{} changed while running, restart to apply", file_name);
        }

        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir().join(file_name))
            .await
            .map_err(|e| Error::Io("failed to open config file", e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Io("failed to append to config file", e))?;

        file.flush()
            .await
            .map_err(|e| Error::Io("failed to append to config file", e))?;

        debug!("appended to {}: {}", file_name, text.trim());

        Ok(())
    }

    /// Starts the Postgres server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is already started, the node is not
    /// initialized, the port is taken, or the server does not become ready
    /// within the startup timeout.
    async fn start(&self) -> Result<(), Error> {
        let spawned = {
            let mut process = self.process.lock().await;
            if process.is_some() {
                return Err(Error::AlreadyStarted);
            }

            if !self.is_initialized() {
                return Err(Error::NotInitialized);
            }

            self.require_binary("postgres")?;
            self.require_binary("pg_isready")?;

            debug!("starting Postgres server...");

            ensure_port_free(self.port).await?;

            // ensure postmaster.pid does not exist
            let postmaster_pid = self.data_dir().join("postmaster.pid");
            if postmaster_pid.exists() {
                tokio::fs::remove_file(&postmaster_pid)
                    .await
                    .map_err(|e| Error::Io("failed to remove postmaster pid", e))?;
            }

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.log_path())
                .map_err(|e| Error::Io("failed to open log file", e))?;

            let app = PostgresApp {
                bin_dir: self.bin_dir.clone(),
                data_dir: self.data_dir(),
                log_file: Arc::new(parking_lot::Mutex::new(log_file)),
                port: self.port,
                startup_timeout: self.startup_timeout,
                username: self.username.clone(),
            };

            let spawned = Arc::new(pgnode_process::start(app).map_err(Error::Startup)?);
            process.replace(Arc::clone(&spawned));

            spawned
        };

        // Readiness is polled without holding the process lock
        if let Err(e) = spawned.wait_until_ready().await {
            spawned.shutdown().await;

            let mut process = self.process.lock().await;
            if process
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &spawned))
            {
                process.take();
            }

            return Err(Error::Startup(e));
        }

        info!("postgres started with pid {} on port {}", spawned.pid(), self.port);

        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<Rows, Error> {
        if self.running_process().await.is_none() {
            return Err(Error::NotRunning);
        }

        psql::execute(&self.bin_dir, self.port, &self.username, sql).await
    }

    async fn wait(&self) {
        let process = self.process.lock().await.clone();
        if let Some(process) = process {
            process.wait().await;
        }
    }

    /// Shuts down the server and removes a temporary base directory.
    async fn teardown(&self) -> Result<(), Error> {
        let taken_initdb = self.initdb.lock().await.take();
        if let Some(initdb) = taken_initdb {
            warn!("initdb still running, stopping it");
            initdb.shutdown().await;
        }

        let taken_process = self.process.lock().await.take();
        if let Some(process) = taken_process {
            info!("postgres shutting down...");
            process.shutdown().await;
            self.stopped.store(true, Ordering::SeqCst);
            info!("postgres shutdown");
        } else {
            debug!("no running Postgres server to shut down");
        }

        let temp_dir = self.temp_dir.lock().take();
        if let Some(temp_dir) = temp_dir {
            if self.keep_data {
                let path = temp_dir.keep();
                info!("keeping node data in {}", path.display());
            } else {
                temp_dir
                    .close()
                    .map_err(|e| Error::Io("failed to remove node directory", e))?;
                debug!("removed {}", self.base_dir.display());
            }
        }

        Ok(())
    }
}
