//! Pulse Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the Pulse workspace.
//!
//! - **Error Handling**: [`PulseError`] and the [`Result`] alias
//! - **Logging**: environment-driven `tracing` setup, see [`logging`]
//!
//! # Example
//!
//! ```no_run
//! use pulse_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{PulseError, Result};
