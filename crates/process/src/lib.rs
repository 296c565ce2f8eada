//! Supervised child processes for locally managed servers.
//!
//! An application describes how to launch a binary, what to do with its
//! output and how to tell when it is ready. [`spawn`] launches it and waits
//! for readiness, [`run`] launches it and waits for it to finish. [`start`]
//! only launches it, leaving the caller to hold the handle while it waits.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! use async_trait::async_trait;
//! use pgnode_process::{ManagedApplication, Result, spawn};
//!
//! struct Sleeper;
//!
//! #[async_trait]
//! impl ManagedApplication for Sleeper {
//!     fn args(&self) -> Vec<String> {
//!         vec!["60".to_string()]
//!     }
//!
//!     fn executable(&self) -> PathBuf {
//!         PathBuf::from("sleep")
//!     }
//!
//!     fn name(&self) -> &str {
//!         "sleeper"
//!     }
//! }
//!
//! async fn sleep_a_bit() -> Result<()> {
//!     let process = spawn(Sleeper).await?;
//!
//!     // Process is now running and ready
//!
//!     process.shutdown().await;
//!
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
mod managed_application;
mod spawn;

pub use error::{Error, Result};
pub use managed_application::ManagedApplication;
pub use nix::sys::signal::Signal;
pub use spawn::{ManagedProcess, run, spawn, start};
