//! Lifecycle events delivered by Juju.

use std::fmt;

const PEBBLE_READY_SUFFIX: &str = "-pebble-ready";

/// One event, parsed from the dispatch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    ConfigChanged,
    PebbleReady { container: String },
    Action { name: String },
    Other(String),
}

impl LifecycleEvent {
    /// Parse `JUJU_DISPATCH_PATH`, e.g. `hooks/config-changed` or
    /// `actions/export`.
    #[must_use]
    pub fn from_dispatch_path(path: &str) -> Self {
        let path = path.trim().trim_start_matches("./");
        if let Some(hook) = path.strip_prefix("hooks/") {
            return Self::from_hook_name(hook);
        }
        if let Some(action) = path.strip_prefix("actions/") {
            return Self::Action {
                name: action.to_string(),
            };
        }
        Self::Other(path.to_string())
    }

    /// Parse a bare hook name, e.g. `install` or `dgraph-pebble-ready`.
    #[must_use]
    pub fn from_hook_name(name: &str) -> Self {
        match name {
            "install" => Self::Install,
            "config-changed" => Self::ConfigChanged,
            other => match other.strip_suffix(PEBBLE_READY_SUFFIX) {
                Some(container) if !container.is_empty() => Self::PebbleReady {
                    container: container.to_string(),
                },
                _ => Self::Other(other.to_string()),
            },
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::ConfigChanged => write!(f, "config-changed"),
            Self::PebbleReady { container } => write!(f, "{container}{PEBBLE_READY_SUFFIX}"),
            Self::Action { name } => write!(f, "action {name}"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}
