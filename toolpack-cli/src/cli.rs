//! CLI definitions using clap derive API

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Toolpack - run the helper tools bundled into this binary
#[derive(Parser, Debug)]
#[command(
    name = "toolpack",
    author,
    version,
    about = "Extract and run bundled helper tools",
    long_about = "Toolpack extracts helper executables bundled for this platform into a private \
                  temp directory, runs them, and removes them afterwards. Tools that are not \
                  bundled are looked up on the system PATH.",
    after_help = "Examples:\n    \
                  toolpack list\n    \
                  toolpack which transcoder\n    \
                  toolpack run transcoder -- --in movie.mkv\n    \
                  toolpack run inference/runtime --threads 4"
)]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List bundled resources
    List(ListArgs),

    /// Show where a tool resolves to
    Which(WhichArgs),

    /// Run a tool and exit with its exit code
    Run(RunArgs),

    /// Show platform, bundle and temp directory information
    Info,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Bundle directory to list (defaults to the bundle root)
    #[arg(default_value = "")]
    pub dir: String,
}

#[derive(Parser, Debug)]
pub struct WhichArgs {
    /// Logical tool name, e.g. `transcoder` or `inference/runtime`
    pub tool: String,

    /// Only consider bundled tools
    #[arg(long)]
    pub no_system: bool,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Logical tool name, e.g. `transcoder` or `inference/runtime`
    pub tool: String,

    /// Only consider bundled tools
    #[arg(long)]
    pub no_system: bool,

    /// Arguments passed to the tool verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}
