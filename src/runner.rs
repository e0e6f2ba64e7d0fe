//! Invocation of the Terraform/OpenTofu binary.
//!
//! Every command runs with `-chdir=<dir>` and `-no-color` so output can be
//! logged verbatim. Arguments are passed directly to the process; no shell is
//! involved.

use crate::error::Result;
use crate::types::CommandOutput;

use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Runs the reconciliation commands of the IaC binary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IacCli: Send + Sync {
    /// Run `init` in every directory, returning one output per directory in input order.
    async fn init(&self, dirs: &[PathBuf], extra_args: &str) -> Vec<(PathBuf, CommandOutput)>;

    /// Run `get` (module fetch) in a single directory.
    async fn fetch_modules(&self, dir: &Path) -> CommandOutput;
}

/// Workspaces of a project as reported by `workspace list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspaces {
    /// All workspace names in listing order
    pub names: Vec<String>,
    /// The selected workspace
    pub current: String,
}

/// [`IacCli`] spawning the real binary.
#[derive(Debug, Clone)]
pub struct ProcessIacCli {
    binary: PathBuf,
}

impl ProcessIacCli {
    /// Create a runner for the given binary (a name on `PATH` or a full path).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The binary this runner invokes.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(
            binary = %self.binary.display(),
            dir = %dir.display(),
            args = ?args,
            "Running command"
        );

        let output = tokio::process::Command::new(&self.binary)
            .arg(format!("-chdir={}", dir.display()))
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                crate::err!(CommandSpawn {
                    program: self.binary.display().to_string(),
                    source: e,
                })
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn init_one(&self, dir: &Path, extra_args: &str) -> CommandOutput {
        let mut args = vec!["init", "-input=false", "-no-color"];
        args.extend(extra_args.split_whitespace());

        self.run(dir, &args)
            .await
            .unwrap_or_else(|e| CommandOutput::failed(e.to_string()))
    }

    /// List the workspaces of an initialized project.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or reports no selected workspace.
    pub async fn list_workspaces(&self, dir: &Path) -> Result<Workspaces> {
        let output = self.run(dir, &["workspace", "list", "-no-color"]).await?;
        if !output.success {
            return Err(crate::err!(CommandFailed {
                command: "workspace list".to_string(),
                dir: dir.to_path_buf(),
                stderr: output.stderr,
            }));
        }

        parse_workspace_list(&output.stdout, dir)
    }

    /// Select a workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn select_workspace(&self, dir: &Path, name: &str) -> Result<()> {
        let output = self
            .run(dir, &["workspace", "select", "-no-color", name])
            .await?;
        if !output.success {
            return Err(crate::err!(CommandFailed {
                command: format!("workspace select {name}"),
                dir: dir.to_path_buf(),
                stderr: output.stderr,
            }));
        }

        tracing::info!(dir = %dir.display(), workspace = %name, "Selected workspace");
        Ok(())
    }
}

#[async_trait]
impl IacCli for ProcessIacCli {
    async fn init(&self, dirs: &[PathBuf], extra_args: &str) -> Vec<(PathBuf, CommandOutput)> {
        let outputs = join_all(dirs.iter().map(|dir| self.init_one(dir, extra_args))).await;
        dirs.iter().cloned().zip(outputs).collect()
    }

    async fn fetch_modules(&self, dir: &Path) -> CommandOutput {
        self.run(dir, &["get", "-no-color"])
            .await
            .unwrap_or_else(|e| CommandOutput::failed(e.to_string()))
    }
}

/// Parse `workspace list` output.
///
/// ```text
///   default
/// * staging
///   prod
/// ```
///
/// # Errors
///
/// Returns an error if no line carries the `*` marker.
pub fn parse_workspace_list(stdout: &str, dir: &Path) -> Result<Workspaces> {
    let mut names = Vec::new();
    let mut current = None;

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let line = line.trim();
        if let Some(name) = line.strip_prefix('*') {
            let name = name.trim().to_string();
            current = Some(name.clone());
            names.push(name);
        } else {
            names.push(line.to_string());
        }
    }

    let Some(current) = current else {
        return Err(crate::err!(WorkspaceList {
            dir: dir.to_path_buf(),
            message: "no active workspace found".to_string(),
        }));
    };

    Ok(Workspaces { names, current })
}
