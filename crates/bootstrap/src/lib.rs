//! Brings up a database node with preloaded extensions for interactive
//! testing.
//!
//! The sequence is fixed: initialize the data directory, append the
//! preload setting, start the server, create each extension, query the
//! server version, print diagnostics, then wait for shutdown.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod bootstrap;
mod config;
mod diagnostics;
mod error;

pub use bootstrap::Bootstrap;
pub use config::BootstrapConfig;
pub use diagnostics::Diagnostics;
pub use error::Error;
