//! Auditgate Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared ambient plumbing for the auditgate workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Error Handling**: the error type returned by that setup
//!
//! # Example
//!
//! ```no_run
//! use auditgate_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> auditgate_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("gateway starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
