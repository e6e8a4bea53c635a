#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

//! # Dgraph operator
//!
//! Sidecar charm that runs Dgraph `zero` and `alpha` under Pebble.
//!
//! The binary is invoked once per Juju event. It parses the dispatch path
//! into a [`LifecycleEvent`], hands it to [`DgraphCharm`], and publishes the
//! resulting status through the hook tools.

pub mod charm;
pub mod cli;
pub mod error;
pub mod event;
pub mod hook_tools;

pub use charm::DgraphCharm;
pub use error::{Error, Result};
pub use event::LifecycleEvent;
pub use hook_tools::{HookStatusReporter, HookTools, JujuHookTools};
