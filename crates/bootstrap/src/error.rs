use thiserror::Error;

/// Errors that can occur while bootstrapping a node.
///
/// `E` is the error type of the node being bootstrapped.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// Writing configuration failed.
    #[error("failed to configure node: {0}")]
    Configuration(#[source] E),

    /// An extension could not be created.
    #[error("failed to create extension {name}: {source}")]
    Extension {
        /// The extension name.
        name: String,

        /// The underlying node error.
        #[source]
        source: E,
    },

    /// The data directory could not be initialized.
    #[error("failed to initialize node: {0}")]
    Initialization(#[source] E),

    /// The version query returned nothing.
    #[error("version query returned no rows")]
    MissingVersion,

    /// Printing diagnostics failed.
    #[error("failed to write diagnostics: {0}")]
    Output(#[from] std::io::Error),

    /// A diagnostic query failed.
    #[error("query failed: {0}")]
    Query(#[source] E),

    /// The server stopped without being asked to.
    #[error("server exited unexpectedly")]
    ServerExited,

    /// The server could not be started.
    #[error("failed to start node: {0}")]
    Startup(#[source] E),

    /// Releasing the node failed.
    #[error("failed to tear down node: {0}")]
    Teardown(#[source] E),
}
