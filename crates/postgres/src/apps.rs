//! Managed applications for the Postgres server binaries.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pgnode_process::{ManagedApplication, Signal};
use regex::Regex;
use tokio::process::Command;
use tracing::{Level, debug, error, info, warn};

use crate::LISTEN_ADDRESS;

/// Regex pattern for matching Postgres log lines
static LOG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3} (?:[A-Z]+|[+-]\d{2}) \[\d+\] (\w+):  (.*)",
    )
    .expect("Invalid regex pattern")
});

/// Splits a server log line into its severity label and message.
pub(crate) fn parse_log_line(line: &str) -> Option<(&str, &str)> {
    let caps = LOG_REGEX.captures(line)?;

    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Maps a server severity label to a tracing level.
pub(crate) fn log_level(label: &str) -> Level {
    match label {
        "DEBUG1" | "DEBUG2" | "DEBUG3" | "DEBUG4" | "DEBUG5" => Level::DEBUG,
        "WARNING" => Level::WARN,
        "ERROR" | "FATAL" | "PANIC" => Level::ERROR,
        // LOG, INFO, NOTICE and the DETAIL/HINT/STATEMENT follow-ups
        _ => Level::INFO,
    }
}

/// Application struct for running the Postgres server
pub(crate) struct PostgresApp {
    pub bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: Arc<Mutex<File>>,
    pub port: u16,
    pub startup_timeout: Duration,
    pub username: String,
}

impl PostgresApp {
    const READY_CHECK_INTERVAL_MS: u64 = 250;

    fn write_log(&self, line: &str) {
        if let Err(e) = writeln!(self.log_file.lock(), "{line}") {
            warn!("failed to write postgres log: {}", e);
        }
    }
}

#[async_trait]
impl ManagedApplication for PostgresApp {
    fn args(&self) -> Vec<String> {
        vec![
            "-D".to_string(),
            self.data_dir.to_string_lossy().to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ]
    }

    fn executable(&self) -> PathBuf {
        self.bin_dir.join("postgres")
    }

    fn name(&self) -> &str {
        "postgres"
    }

    fn handle_stdout(&self, line: &str) {
        self.write_log(line);

        let (label, message) = parse_log_line(line).unwrap_or(("LOG", line));
        let level = log_level(label);
        if level == Level::ERROR {
            error!(target: "postgres", "{}: {}", label, message);
        } else if level == Level::WARN {
            warn!(target: "postgres", "{}", message);
        } else if level == Level::DEBUG {
            debug!(target: "postgres", "{}", message);
        } else {
            info!(target: "postgres", "{}", message);
        }
    }

    fn handle_stderr(&self, line: &str) {
        self.handle_stdout(line); // Postgres sends all logs to stderr, so handle them the same way
    }

    async fn is_ready_check(&self) -> bool {
        debug!(
            "checking if postgres is ready on {}:{}",
            LISTEN_ADDRESS, self.port
        );

        match Command::new(self.bin_dir.join("pg_isready"))
            .arg("-q")
            .arg("-h")
            .arg(LISTEN_ADDRESS)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(&self.username)
            .arg("-d")
            .arg("postgres")
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    fn is_ready_check_interval_ms(&self) -> u64 {
        Self::READY_CHECK_INTERVAL_MS
    }

    fn is_ready_check_max(&self) -> Option<u32> {
        let checks = self.startup_timeout.as_millis() / u128::from(Self::READY_CHECK_INTERVAL_MS);

        Some(u32::try_from(checks).unwrap_or(u32::MAX).max(1))
    }

    fn shutdown_signal(&self) -> Signal {
        // Fast shutdown: disconnect clients instead of waiting for them
        Signal::SIGINT
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Application for creating a new data directory with `initdb`
pub(crate) struct InitDbApp {
    pub bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub username: String,
}

#[async_trait]
impl ManagedApplication for InitDbApp {
    fn args(&self) -> Vec<String> {
        vec![
            "-D".to_string(),
            self.data_dir.to_string_lossy().to_string(),
            "-U".to_string(),
            self.username.clone(),
            "--auth=trust".to_string(),
            "--encoding=UTF8".to_string(),
            "--no-sync".to_string(),
        ]
    }

    fn executable(&self) -> PathBuf {
        self.bin_dir.join("initdb")
    }

    fn name(&self) -> &str {
        "initdb"
    }

    fn handle_stdout(&self, line: &str) {
        debug!(target: "initdb", "{}", line);
    }

    fn handle_stderr(&self, line: &str) {
        warn!(target: "initdb", "{}", line);
    }
}
