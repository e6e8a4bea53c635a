//! Pebble layer for the Dgraph workload.
//!
//! Two services run in the container: `zero` (cluster coordinator) and
//! `alpha` (data node). The alpha command optionally carries a whitelist for
//! the admin endpoints. Commands are assembled as argument lists and rendered
//! with POSIX quoting, so the whitelist only ever reaches `dgraph` as a
//! positional argument of the wrapper script.

use std::fmt;

use dgraph_pebble::{Layer, ServiceSpec};
use itertools::Itertools;

/// Label under which the layer is added to the plan.
pub const LAYER_LABEL: &str = "dgraph";
/// Layer summary.
pub const LAYER_SUMMARY: &str = "dgraph layer";
/// Layer description.
pub const LAYER_DESCRIPTION: &str = "pebble config layer for dgraph";

/// Coordinator service name.
pub const ZERO: &str = "zero";
/// Data node service name.
pub const ALPHA: &str = "alpha";
/// Services in the order they are (re)started.
pub const RESTART_ORDER: [&str; 2] = [ZERO, ALPHA];

const ZERO_SCRIPT: &str = "set -ex; cd /data; exec dgraph zero --my=$(hostname -f):5080";
const ALPHA_SCRIPT: &str = r#"set -ex; cd /data; exec dgraph alpha --my=$(hostname -f):7080 --zero $(hostname -f):5080 "$@""#;

/// A program and its arguments, rendered as a single shell-safe string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Start a command line for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Run `script` through `bash -c`.
    ///
    /// The first argument added afterwards is `$0`, the rest are `"$@"`.
    pub fn bash_script(script: &str) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append every argument in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The argument vector, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect_vec()
    }

    /// Render as one string Pebble can split back into `argv`.
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| quote(word))
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote a word for a POSIX shell.
///
/// Words made only of characters with no shell meaning are left as they are.
#[must_use]
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

const fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '_' | '-')
}

/// Command line for the zero service.
#[must_use]
pub fn zero_command() -> CommandLine {
    CommandLine::bash_script(ZERO_SCRIPT)
}

/// Command line for the alpha service.
///
/// An empty whitelist adds no security flag.
#[must_use]
pub fn alpha_command(whitelist: &str) -> CommandLine {
    let command = CommandLine::bash_script(ALPHA_SCRIPT).arg(ALPHA);
    if whitelist.is_empty() {
        command
    } else {
        command.args(["--security".to_string(), format!("whitelist={whitelist}")])
    }
}

/// Build the layer for the given whitelist.
#[must_use]
pub fn build_layer(whitelist: &str) -> Layer {
    Layer::new(LAYER_SUMMARY, LAYER_DESCRIPTION)
        .with_service(ZERO, ServiceSpec::new(ZERO, zero_command().render()))
        .with_service(ALPHA, ServiceSpec::new(ALPHA, alpha_command(whitelist).render()))
}
