use std::io::Write;

use pgnode_node::Node;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BootstrapConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Error;

/// Provisions a node, reports on it and keeps it alive until shutdown.
///
/// The bootstrap owns the node for its whole lifetime and tears it down
/// exactly once when [`run`](Bootstrap::run) returns, whichever way it
/// returns.
pub struct Bootstrap<N, W>
where
    N: Node,
    W: Write + Send,
{
    config: BootstrapConfig,
    node: N,
    output: W,
    shutdown_token: CancellationToken,
}

impl<N, W> Bootstrap<N, W>
where
    N: Node,
    W: Write + Send,
{
    /// Creates a new bootstrap for `node`, printing diagnostics to `output`.
    pub const fn new(
        config: BootstrapConfig,
        node: N,
        output: W,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            node,
            output,
            shutdown_token,
        }
    }

    /// Provisions the node and blocks until the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first provisioning step that failed, `ServerExited` if
    /// the server stopped on its own, or `Teardown` if an otherwise
    /// successful run could not release the node.
    pub async fn run(mut self) -> Result<(), Error<N::Error>> {
        let result = self.provision_and_idle().await;

        self.unwind(result).await
    }

    async fn provision_and_idle(&mut self) -> Result<(), Error<N::Error>> {
        let diagnostics = tokio::select! {
            result = self.provision() => result?,
            () = self.shutdown_token.cancelled() => {
                warn!("shutdown requested while provisioning {}", self.node.name());
                return Ok(());
            }
        };

        write!(self.output, "{diagnostics}")?;
        self.output.flush()?;

        self.idle().await
    }

    async fn provision(&self) -> Result<Diagnostics, Error<N::Error>> {
        info!("initializing node {}...", self.node.name());
        self.node.init().await.map_err(Error::Initialization)?;

        self.node
            .append_conf(
                &self.config.conf_file,
                &self.config.preload_libraries_line(),
            )
            .await
            .map_err(Error::Configuration)?;

        info!("starting node {} on port {}...", self.node.name(), self.node.port());
        self.node.start().await.map_err(Error::Startup)?;

        for extension in &self.config.extensions {
            self.node
                .execute(&format!("create extension {extension}"))
                .await
                .map_err(|source| Error::Extension {
                    name: extension.clone(),
                    source,
                })?;

            info!("created extension {}", extension);
        }

        let version = self
            .node
            .execute("select version()")
            .await
            .map_err(Error::Query)?
            .first_value()
            .map(str::to_string)
            .ok_or(Error::MissingVersion)?;

        let pid = self.node.pid().await.ok_or(Error::ServerExited)?;

        Ok(Diagnostics {
            bin_dir: self.node.bin_dir().to_path_buf(),
            log_path: self.node.log_path(),
            name: self.node.name().to_string(),
            pid,
            port: self.node.port(),
            version,
        })
    }

    async fn idle(&self) -> Result<(), Error<N::Error>> {
        info!("node {} is running", self.node.name());

        tokio::select! {
            () = self.shutdown_token.cancelled() => {
                info!("shutdown requested");
                Ok(())
            }
            () = self.node.wait() => {
                error!("node {} exited unexpectedly", self.node.name());
                Err(Error::ServerExited)
            }
        }
    }

    async fn unwind(self, result: Result<(), Error<N::Error>>) -> Result<(), Error<N::Error>> {
        if let Err(e) = &result {
            error!("bootstrap failed: {}", e);
        }

        let status = self.node.status().await;
        info!("tearing down node {} ({})...", self.node.name(), status);

        match (result, self.node.teardown().await) {
            (Ok(()), Ok(())) => {
                info!("node {} torn down", self.node.name());
                Ok(())
            }
            (Ok(()), Err(e)) => Err(Error::Teardown(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                error!("teardown after failure also failed: {}", teardown_error);
                Err(e)
            }
        }
    }
}
