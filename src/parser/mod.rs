//! HCL parsing module for Terraform/OpenTofu files.
//!
//! This module turns configuration files into typed [`DeclaredResources`]
//! and reads the dependency lock file written by `init`.
//!
//! # Supported Constructs
//!
//! - `module` blocks with source and version attributes
//! - `terraform.required_providers` blocks
//! - `terraform.required_version` constraints
//! - `provider` blocks of `.terraform.lock.hcl`
//!
//! # Example
//!
//! ```rust,no_run
//! use tftoolbox::parser::{ConfigFileParser, HclConfigParser};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let parser = HclConfigParser::new();
//!     if let Some(resources) = parser.parse(Path::new("./main.tf")).await {
//!         println!("Found {} providers", resources.providers.len());
//!     }
//! }
//! ```

mod hcl;
mod lock;

pub use hcl::HclConfigParser;
pub use lock::parse_lock_file;

use crate::types::DeclaredResources;
use async_trait::async_trait;
use std::path::Path;

/// File extensions of Terraform/OpenTofu configuration files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf"];

/// Name of the tool's local state directory inside a project.
pub const STATE_DIR: &str = ".terraform";

/// Name of the dependency lock file inside a project.
pub const LOCK_FILE: &str = ".terraform.lock.hcl";

/// Directories never descended into while discovering projects.
pub const SKIP_DIRS: &[&str] = &[STATE_DIR, ".terragrunt-cache", ".git"];

/// Parses a configuration file into the resources it declares.
///
/// Implementations never fail: an unreadable or invalid file yields `None`,
/// which callers treat the same as a file without resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigFileParser: Send + Sync {
    /// Parse a single configuration file.
    async fn parse(&self, path: &Path) -> Option<DeclaredResources>;
}

/// Returns true if the path names a configuration file.
#[must_use]
pub fn is_config_file(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    TERRAFORM_EXTENSIONS
        .iter()
        .any(|ext| path_str.ends_with(ext))
}

/// Returns true if the path is the lock file or lies inside a tool state directory.
///
/// Changes there are side effects of `init`/`get` rather than user edits.
#[must_use]
pub fn is_in_state_dir(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == LOCK_FILE)
        || path.components().any(|c| c.as_os_str() == STATE_DIR)
}
