//! Pebble integration for the Dgraph operator.
//!
//! Pebble supervises the processes inside the workload container. The
//! operator talks to it through the [`Supervisor`] trait:
//!
//! - [`PebbleClient`]: the real API over the container's unix socket
//! - [`InMemorySupervisor`]: a recording stand-in for tests
//!
//! # Example
//!
//! ```ignore
//! use dgraph_pebble::{Layer, PebbleClient, ServiceSpec, Supervisor};
//!
//! let client = PebbleClient::new("/charm/containers/dgraph/pebble.socket", "/charm/bin/pebble");
//! let layer = Layer::new("dgraph layer", "pebble config layer for dgraph")
//!     .with_service("zero", ServiceSpec::new("zero", "dgraph zero"));
//! client.add_layer("dgraph", &layer, true).await?;
//! client.restart("zero").await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod error;
pub mod memory;
pub mod supervisor;
pub mod types;

pub use client::PebbleClient;
pub use error::{Error, Result};
pub use memory::{InMemorySupervisor, SupervisorCall};
pub use supervisor::Supervisor;
pub use types::{
    ExecOutput, Layer, Override, Plan, ServiceInfo, ServiceSpec, ServiceStatus, Startup,
};
