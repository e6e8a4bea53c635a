//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dgraph operator
#[derive(Parser, Debug)]
#[command(name = "dgraph-operator")]
#[command(version)]
#[command(about = "Runs Dgraph zero and alpha under Pebble")]
#[command(
    long_about = "Juju sidecar operator for Dgraph. Invoked once per hook or action, it keeps the Pebble layer in line with the charm configuration, bootstraps demo data at install and exports the database on request."
)]
pub struct Cli {
    /// Operator configuration file (defaults to $JUJU_CHARM_DIR/operator.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle the event Juju is dispatching
    Dispatch {
        /// Dispatch path, e.g. hooks/config-changed
        #[arg(long, env = "JUJU_DISPATCH_PATH")]
        path: Option<String>,
    },

    /// Handle a single event by name
    Hook {
        /// Hook name (install, config-changed, dgraph-pebble-ready) or
        /// dispatch path (actions/export)
        name: String,
    },

    /// Print the Pebble layer as YAML
    Layer {
        /// Whitelist for the alpha admin endpoints
        #[arg(short, long, default_value = "")]
        whitelist: String,
    },
}
