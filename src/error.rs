//! Error types for tftoolbox.
//!
//! This module defines the error hierarchy using `thiserror`. Every variant
//! records the source location where it was raised so log lines point back
//! at the code that gave up.
//!
//! # Error Categories
//!
//! - **IO errors**: file system operations on project folders
//! - **Parse errors**: HCL configuration, lock files, module manifests, version constraints
//! - **Command errors**: spawning or running the Terraform/OpenTofu binary
//! - **Config errors**: invalid configuration files or values
//! - **Watch errors**: file watcher setup
//!
//! # Example
//!
//! ```rust
//! use tftoolbox::error::{ToolboxError, Result};
//!
//! fn read_lock_file(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| ToolboxError::io(path, e, file!(), line!()))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigValue { key: "reconcile.processing_delay_ms".to_string(), message }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::ToolboxError::$variant {
            $($field: $value,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for tftoolbox operations.
pub type Result<T> = std::result::Result<T, ToolboxError>;

/// The main error type for tftoolbox.
#[derive(Error, Debug)]
pub enum ToolboxError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Directory not found.
    #[error("Directory not found: {path} ({src_path}:{src_line})")]
    DirectoryNotFound {
        /// The missing directory path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// HCL parsing error.
    #[error("Failed to parse HCL in '{file}' ({src_path}:{src_line}): {message}")]
    HclParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Dependency lock file could not be interpreted.
    #[error("Invalid lock file '{file}' ({src_path}:{src_line}): {message}")]
    LockFileParse {
        /// The lock file
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// `modules.json` could not be interpreted.
    #[error("Invalid module manifest '{file}' ({src_path}:{src_line}): {message}")]
    ModulesManifestParse {
        /// The manifest file
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Version parsing error.
    #[error("Failed to parse version '{version}' ({src_path}:{src_line}): {source}")]
    VersionParse {
        /// The version string that failed to parse
        version: String,
        /// The underlying semver error
        #[source]
        source: semver::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid constraint syntax.
    #[error("Invalid version constraint '{constraint}' ({src_path}:{src_line}): {message}")]
    ConstraintParse {
        /// The constraint string that failed to parse
        constraint: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Command Errors
    // =========================================================================
    /// The IaC binary could not be started.
    #[error("Failed to run '{program}' ({src_path}:{src_line}): {source}")]
    CommandSpawn {
        /// The program that failed to start
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The IaC binary exited unsuccessfully.
    #[error("'{command}' failed in '{dir}' ({src_path}:{src_line}): {stderr}")]
    CommandFailed {
        /// Subcommand that failed (e.g. "init")
        command: String,
        /// Project directory
        dir: PathBuf,
        /// Captured stderr
        stderr: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// `workspace list` output could not be interpreted.
    #[error("Could not evaluate workspaces in '{dir}' ({src_path}:{src_line}): {message}")]
    WorkspaceList {
        /// Project directory
        dir: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Watcher Errors
    // =========================================================================
    /// File watcher error.
    #[error("File watcher error on '{path}' ({src_path}:{src_line}): {source}")]
    Watch {
        /// The watched path
        path: PathBuf,
        /// The underlying notify error
        #[source]
        source: notify::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },
}

impl ToolboxError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source,
            src_path,
            src_line,
        }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::ConfigParse {
            message,
            source,
            src_path,
            src_line,
        }
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::DirectoryNotFound { .. } => 15,
            Self::CommandSpawn { .. } => 16,
            Self::CommandFailed { .. } => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::Watch { .. } => 22,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for ToolboxError {
    fn from(source: std::io::Error) -> Self {
        // Prefer ToolboxError::io(path, ..) wherever the path is known
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for ToolboxError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}
