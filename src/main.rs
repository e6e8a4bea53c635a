//! # Dgraph operator entry point
//!
//! Juju runs the charm's `dispatch` script once per event; the script execs
//! this binary. One run handles exactly one event:
//!
//! 1. **Tracing** - `RUST_LOG` filter, output on stderr (the Juju debug log)
//! 2. **Configuration** - defaults, optional TOML file, `DGRAPH_OPERATOR_*`
//! 3. **Event** - parsed from `JUJU_DISPATCH_PATH` or the command line
//! 4. **Handling** - reconcile, bootstrap or export, then `status-set`
//!
//! Handler failures are reported as unit status, so hooks always exit 0.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dgraph_core::{OperatorConfig, ResultExt};
use dgraph_operator::cli::{Cli, Commands};
use dgraph_operator::{DgraphCharm, Error, JujuHookTools, LifecycleEvent};
use dgraph_reconciler::build_layer;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let event = match cli.command {
        Commands::Layer { whitelist } => {
            let yaml = build_layer(&whitelist)
                .to_yaml()
                .context("Failed to render layer")?;
            print!("{yaml}");
            return Ok(());
        }
        Commands::Dispatch { path } => {
            let path = path.ok_or(Error::MissingDispatchPath)?;
            LifecycleEvent::from_dispatch_path(&path)
        }
        Commands::Hook { name } => {
            if name.contains('/') {
                LifecycleEvent::from_dispatch_path(&name)
            } else {
                LifecycleEvent::from_hook_name(&name)
            }
        }
    };

    let config = load_config(cli.config.as_deref());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let tools = Arc::new(JujuHookTools::new());
        let charm = DgraphCharm::from_config(&config, tools).context("Failed to set up charm")?;

        if let Some(status) = charm.handle(&event).await {
            info!(event = %event, status = %status, "Event handled");
        }
        Ok(())
    })
}

/// Initialize tracing to stderr; stdout belongs to the hook tools.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dgraph_operator=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the operator configuration, falling back to defaults.
///
/// A broken configuration must not fail the hook, so errors are logged and
/// the built-in defaults are used instead.
fn load_config(explicit: Option<&Path>) -> OperatorConfig {
    let charm_dir = std::env::var_os("JUJU_CHARM_DIR").map(PathBuf::from);
    OperatorConfig::load(explicit, charm_dir.as_deref())
        .or_default_logged(OperatorConfig::default())
}
