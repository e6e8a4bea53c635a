//! Core types shared by the Dgraph operator crates.
//!
//! - [`Error`] / [`Result`]: typed errors for configuration and local state
//! - [`OperatorConfig`]: deployment settings (defaults → TOML → environment)
//! - [`CharmConfig`]: the Juju-owned `whitelist` option

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod error;
pub mod result;

pub use config::{CharmConfig, OperatorConfig};
pub use error::Error;
pub use result::{Result, ResultExt};
