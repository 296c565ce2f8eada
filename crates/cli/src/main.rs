//! CLI binary to run a throwaway Postgres node with preloaded extensions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pgnode_bootstrap::{Bootstrap, BootstrapConfig};
use pgnode_postgres::{CONF_FILE, Postgres, PostgresOptions};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No binary directory was given and `postgres` is not on `PATH`.
    #[error("no postgres binary directory: pass --bin-dir or set PG_BIN")]
    BinDirNotFound,

    /// Bootstrap error
    #[error(transparent)]
    Bootstrap(#[from] pgnode_bootstrap::Error<pgnode_postgres::Error>),

    /// Node could not be created
    #[error(transparent)]
    Postgres(#[from] pgnode_postgres::Error),

    /// Signal handler could not be installed
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory for node data and logs (temporary if unset)
    #[arg(long, env = "PGNODE_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Directory containing the postgres binaries
    #[arg(long, env = "PG_BIN")]
    bin_dir: Option<PathBuf>,

    /// Extensions to create once the server is up
    #[arg(
        long = "extension",
        default_values = ["pg_stat_statements", "sr_plan"],
        env = "PGNODE_EXTENSIONS",
        value_delimiter = ','
    )]
    extensions: Vec<String>,

    /// Keep the temporary data directory after shutdown
    #[arg(long, env = "PGNODE_KEEP_DATA")]
    keep_data: bool,

    /// Port for the server to listen on
    #[arg(long, default_value_t = 5432, env = "PGNODE_PORT")]
    port: u16,

    /// Libraries to load through shared_preload_libraries
    #[arg(
        long = "preload-library",
        default_values = ["pg_stat_statements", "sr_plan"],
        env = "PGNODE_PRELOAD_LIBRARIES",
        value_delimiter = ','
    )]
    preload_libraries: Vec<String>,

    /// Seconds to wait for the server to accept connections
    #[arg(long, default_value_t = 30, env = "PGNODE_STARTUP_TIMEOUT_SECS")]
    startup_timeout_secs: u64,

    /// Superuser created by initdb
    #[arg(long, default_value = "postgres", env = "PGNODE_USERNAME")]
    username: String,
}

fn resolve_bin_dir(bin_dir: Option<PathBuf>) -> Result<PathBuf, Error> {
    if let Some(bin_dir) = bin_dir {
        return Ok(bin_dir);
    }

    which::which("postgres")
        .ok()
        .and_then(|path| path.parent().map(PathBuf::from))
        .ok_or(Error::BinDirNotFound)
}

fn postgres_options(args: &Args) -> Result<PostgresOptions, Error> {
    Ok(PostgresOptions {
        base_dir: args.base_dir.clone(),
        bin_dir: resolve_bin_dir(args.bin_dir.clone())?,
        keep_data: args.keep_data,
        name: None,
        port: args.port,
        startup_timeout: Duration::from_secs(args.startup_timeout_secs),
        username: args.username.clone(),
    })
}

fn bootstrap_config(args: &Args) -> BootstrapConfig {
    BootstrapConfig {
        conf_file: CONF_FILE.to_string(),
        extensions: args.extensions.clone(),
        preload_libraries: args.preload_libraries.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Logs go to stderr so stdout only carries the diagnostics
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let node = Postgres::new(postgres_options(&args)?)?;

    let shutdown_token = CancellationToken::new();

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Signal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(Error::Signal)?;
    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    Bootstrap::new(
        bootstrap_config(&args),
        node,
        std::io::stdout(),
        shutdown_token,
    )
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "pgnode",
            "--bin-dir",
            "/opt/pg_10/bin",
            "--port",
            "6543",
            "--extension",
            "sr_plan",
            "--preload-library",
            "sr_plan,auto_explain",
            "--keep-data",
        ])
        .unwrap();

        assert_eq!(args.port, 6543);
        assert_eq!(args.extensions, vec!["sr_plan"]);
        assert_eq!(args.preload_libraries, vec!["sr_plan", "auto_explain"]);
        assert!(args.keep_data);

        let options = postgres_options(&args).unwrap();
        assert_eq!(options.bin_dir, PathBuf::from("/opt/pg_10/bin"));
        assert_eq!(options.startup_timeout, Duration::from_secs(30));

        assert_eq!(
            bootstrap_config(&args).preload_libraries_line(),
            "shared_preload_libraries = 'sr_plan, auto_explain'"
        );
    }

    #[test]
    fn test_explicit_bin_dir_wins() {
        assert_eq!(
            resolve_bin_dir(Some(PathBuf::from("/opt/pg_10/bin"))).unwrap(),
            PathBuf::from("/opt/pg_10/bin")
        );
    }
}
