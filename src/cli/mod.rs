//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `watch`: Reconcile projects in the background while files change
//! - `init`: Initialize every project below a directory
//! - `get`: Fetch modules of a single project
//! - `status`: Show initialization state of every project
//! - `workspace`: List or select workspaces
//! - `config`: Create or validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Watch the current directory, running init/get after a 500 ms quiet period
//! tftoolbox watch --delay-ms 500
//!
//! # Watch with OpenTofu, never running init automatically
//! tftoolbox watch ./infra --tool opentofu --no-auto-init
//!
//! # Initialize all projects
//! tftoolbox init ./infra
//!
//! # Project status as JSON
//! tftoolbox status ./infra --format json
//!
//! # Switch workspace
//! tftoolbox workspace select staging ./infra/app
//! ```

use crate::provider::IacTool;
use crate::types::ReportFormat;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tftoolbox - keeps Terraform/OpenTofu projects initialized while you edit them.
#[derive(Parser, Debug)]
#[command(
    name = "tftoolbox",
    author,
    version,
    about = "Keeps Terraform/OpenTofu projects initialized while you edit them",
    long_about = "tftoolbox watches Terraform/OpenTofu configuration files, detects providers \
                  and modules that are declared but not installed, and runs init or get for \
                  the affected projects once edits settle down."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TFTOOLBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, default_value = "text", value_enum)]
    pub log_format: LogFormat,

    /// IaC tool to drive (overrides configuration)
    #[arg(long, global = true, value_enum)]
    pub tool: Option<IacTool>,

    /// Path to the IaC binary (overrides configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub binary: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch configuration files and reconcile projects in the background
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Initialize every project below a directory
    Init(InitArgs),

    /// Fetch the modules of one project
    Get(GetArgs),

    /// Show the state of every project below a directory
    #[command(visible_alias = "s")]
    Status(StatusArgs),

    /// Manage workspaces of a project
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for the watch command.
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Directory to watch
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Quiet period in milliseconds before a reconciliation pass runs
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Never run init automatically
    #[arg(long)]
    pub no_auto_init: bool,

    /// Never fetch modules automatically
    #[arg(long)]
    pub no_auto_fetch: bool,

    /// Ignore projects that have never been initialized
    #[arg(long)]
    pub only_initialized: bool,
}

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory containing the projects
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,
}

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Project directory
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Directory containing the projects
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: ReportFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Workspace subcommands.
#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// List workspaces, marking the selected one
    List {
        /// Project directory
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Select a workspace
    Select {
        /// Workspace name
        name: String,

        /// Project directory
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create an example configuration file
    Init {
        /// Where to write the file
        #[arg(value_name = "FILE", default_value = "tftoolbox.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the config validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(id = "file", value_name = "FILE", default_value = "tftoolbox.yaml")]
    pub file: PathBuf,
}
