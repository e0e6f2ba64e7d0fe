//! # tftoolbox
//!
//! Keeps Terraform/OpenTofu projects initialized while you edit them.
//!
//! tftoolbox watches configuration files, parses every changed file, checks
//! whether the providers and modules it declares are installed, and runs
//! `init` or `get` for the affected projects once edits settle down.
//!
//! ## Features
//!
//! - **Debounced reconciliation**: bursts of saves collapse into one pass
//! - **Per-project locking**: two operations never run in the same directory at once
//! - **Failure isolation**: one broken project never blocks the others
//! - **Terraform and OpenTofu**: selected by configuration
//! - **Project status**: text and JSON reports of what each project needs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tftoolbox::{Config, ReconcileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = ReconcileService::from_config(Arc::new(Config::default()));
//!     let mut reports = service.subscribe();
//!
//!     service.handle_file_event(Path::new("./infra/main.tf")).await;
//!
//!     if let Ok(report) = reports.recv().await {
//!         println!("{} projects reconciled", report.init.len() + report.fetch.len());
//!     }
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod config;
pub mod error;
pub mod parser;
pub mod project;
pub mod provider;
pub mod reconcile;
pub mod reporter;
pub mod runner;
pub mod status;
pub mod types;
pub mod watch;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Result, ToolboxError};
pub use provider::{IacProvider, IacTool};
pub use reconcile::{Classification, DirectoryMutex, ReconcileService};
pub use types::{
    CommandOutput, Constraint, DeclaredResources, PassReport, ProjectOutcome, ReportFormat,
    VersionRange, WorkKind,
};

use parser::HclConfigParser;
use runner::IacCli;
use std::path::Path;

/// Initialize every project below `root` with one consolidated `init`.
///
/// Folders whose configuration declares neither modules nor providers are
/// skipped. Returns one outcome per initialized project; a failing project
/// does not stop the others.
///
/// # Errors
///
/// Returns an error if `root` cannot be scanned.
pub async fn init_projects(
    root: &Path,
    config: &Config,
    cli: &dyn IacCli,
) -> Result<Vec<ProjectOutcome>> {
    let parser = HclConfigParser::new();
    let mut folders = Vec::new();
    for folder in project::find_project_folders(root, &config.scan)? {
        match parser.parse_directory(&folder).await {
            Ok(declared) if !declared.is_empty() => folders.push(folder),
            Ok(_) => {
                tracing::info!(dir = %folder.display(), "No modules or providers declared, skipping");
            }
            Err(e) => {
                tracing::warn!(dir = %folder.display(), error = %e, "Could not read project, skipping");
            }
        }
    }
    if folders.is_empty() {
        tracing::warn!(root = %root.display(), "No projects found");
        return Ok(Vec::new());
    }

    tracing::info!(root = %root.display(), projects = folders.len(), "Initializing projects");

    let outcomes: Vec<ProjectOutcome> = cli
        .init(&folders, &config.iac.init_args)
        .await
        .into_iter()
        .map(|(dir, output)| ProjectOutcome {
            dir,
            kind: WorkKind::Init,
            output,
        })
        .collect();

    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        tracing::error!(
            dir = %outcome.dir.display(),
            stderr = %outcome.output.stderr.trim(),
            "Init failed"
        );
    }

    Ok(outcomes)
}
