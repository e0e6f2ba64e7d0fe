//! On-disk project state inspection.
//!
//! A project is a directory holding `*.tf` files. After `init` the tool leaves
//! its state next to them:
//!
//! ```text
//! project/
//! ├── main.tf
//! ├── .terraform.lock.hcl
//! └── .terraform/
//!     ├── environment                      # selected workspace
//!     ├── modules/modules.json             # installed modules
//!     └── providers/<domain>/<ns>/<name>/<version>/
//! ```

use crate::config::ScanOptions;
use crate::error::{Result, ToolboxError};
use crate::parser::{is_config_file, parse_lock_file, LOCK_FILE, SKIP_DIRS, STATE_DIR};
use crate::types::{InstalledModule, LockedProvider};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Workspace selected when `.terraform/environment` is absent.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Read-only view of what a project has installed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectInspector: Send + Sync {
    /// Whether `init` has ever run in `dir`.
    async fn is_initialized(&self, dir: &Path) -> bool;

    /// Providers recorded in the dependency lock file.
    ///
    /// A missing lock file yields an empty list.
    async fn installed_providers(&self, dir: &Path) -> Result<Vec<LockedProvider>>;

    /// Whether the provider cache holds `provider_key` at exactly `version`.
    async fn provider_cache_entry_exists(&self, dir: &Path, provider_key: &str, version: &str)
        -> bool;

    /// Modules recorded in the module manifest.
    async fn installed_modules(&self, dir: &Path) -> Vec<InstalledModule>;

    /// Currently selected workspace, `None` if the project is not initialized.
    async fn current_workspace(&self, dir: &Path) -> Option<String>;
}

/// Inspector reading the tool's state directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProjectInspector;

impl FsProjectInspector {
    /// Create a new inspector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct ModulesManifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<InstalledModule>,
}

#[async_trait]
impl ProjectInspector for FsProjectInspector {
    async fn is_initialized(&self, dir: &Path) -> bool {
        tokio::fs::metadata(dir.join(STATE_DIR))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    async fn installed_providers(&self, dir: &Path) -> Result<Vec<LockedProvider>> {
        let lock_path = dir.join(LOCK_FILE);
        let content = match tokio::fs::read_to_string(&lock_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ToolboxError::io(&lock_path, e, file!(), line!())),
        };

        parse_lock_file(&content, &lock_path)
    }

    async fn provider_cache_entry_exists(
        &self,
        dir: &Path,
        provider_key: &str,
        version: &str,
    ) -> bool {
        let mut path = dir.join(STATE_DIR).join("providers");
        for segment in provider_key.split('/') {
            path.push(segment);
        }
        path.push(version);

        let exists = tokio::fs::metadata(&path).await.is_ok();
        tracing::trace!(path = %path.display(), exists, "Checked provider cache entry");
        exists
    }

    async fn installed_modules(&self, dir: &Path) -> Vec<InstalledModule> {
        let manifest_path = dir.join(STATE_DIR).join("modules").join("modules.json");
        let Ok(content) = tokio::fs::read_to_string(&manifest_path).await else {
            return Vec::new();
        };

        match serde_json::from_str::<ModulesManifest>(&content) {
            Ok(manifest) => manifest.modules,
            Err(e) => {
                let e = crate::err!(ModulesManifestParse {
                    file: manifest_path,
                    message: e.to_string(),
                });
                tracing::debug!(error = %e, "Ignoring module manifest");
                Vec::new()
            }
        }
    }

    async fn current_workspace(&self, dir: &Path) -> Option<String> {
        if !self.is_initialized(dir).await {
            return None;
        }

        let environment = dir.join(STATE_DIR).join("environment");
        let workspace = tokio::fs::read_to_string(&environment)
            .await
            .ok()
            .and_then(|content| content.lines().next().map(|l| l.trim().to_string()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());

        Some(workspace)
    }
}

/// Find every project folder below `root`.
///
/// A project folder is any directory directly containing a configuration
/// file. Hidden directories, tool state directories and paths matching
/// `scan.exclude_patterns` are not descended into.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn find_project_folders(root: &Path, scan: &ScanOptions) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(crate::err!(DirectoryNotFound {
            path: root.to_path_buf(),
        }));
    }

    let excludes: Vec<glob::Pattern> = scan
        .exclude_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut folders = BTreeSet::new();

    for entry in WalkDir::new(root)
        .max_depth(scan.max_depth)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_skip(e.path(), &excludes))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read directory entry");
                continue;
            }
        };

        if entry.file_type().is_file() && is_config_file(entry.path()) {
            if let Some(parent) = entry.path().parent() {
                folders.insert(parent.to_path_buf());
            }
        }
    }

    tracing::debug!(root = %root.display(), count = folders.len(), "Discovered project folders");

    Ok(folders.into_iter().collect())
}

fn should_skip(path: &Path, excludes: &[glob::Pattern]) -> bool {
    if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
        if SKIP_DIRS.contains(&file_name) {
            return true;
        }
        if file_name.starts_with('.') && path.is_dir() {
            return true;
        }
    }

    if excludes.iter().any(|p| p.matches_path(path)) {
        tracing::trace!(path = %path.display(), reason = "matches exclude pattern", "Skipping path");
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const LOCK: &str = r#"
provider "registry.terraform.io/hashicorp/aws" {
  version     = "5.31.0"
  constraints = ">= 5.0.0"
}
"#;

    #[tokio::test]
    async fn test_uninitialized_project() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = FsProjectInspector::new();

        assert!(!inspector.is_initialized(dir.path()).await);
        assert!(inspector.installed_providers(dir.path()).await.unwrap().is_empty());
        assert!(inspector.installed_modules(dir.path()).await.is_empty());
        assert_eq!(inspector.current_workspace(dir.path()).await, None);
    }

    #[tokio::test]
    async fn test_initialized_project() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join(LOCK_FILE), LOCK).unwrap();
        fs::create_dir_all(
            root.join(".terraform/providers/registry.terraform.io/hashicorp/aws/5.31.0"),
        )
        .unwrap();
        fs::create_dir_all(root.join(".terraform/modules")).unwrap();
        fs::write(
            root.join(".terraform/modules/modules.json"),
            r#"{"Modules":[{"Key":"","Source":"","Dir":"."},{"Key":"vpc","Source":"registry.terraform.io/terraform-aws-modules/vpc/aws","Version":"5.1.2","Dir":".terraform/modules/vpc"}]}"#,
        )
        .unwrap();

        let inspector = FsProjectInspector::new();
        assert!(inspector.is_initialized(root).await);

        let providers = inspector.installed_providers(root).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].version.as_deref(), Some("5.31.0"));

        assert!(
            inspector
                .provider_cache_entry_exists(root, "registry.terraform.io/hashicorp/aws", "5.31.0")
                .await
        );
        assert!(
            !inspector
                .provider_cache_entry_exists(root, "registry.terraform.io/hashicorp/aws", "5.30.0")
                .await
        );

        let modules = inspector.installed_modules(root).await;
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[1].version.as_deref(), Some("5.1.2"));

        assert_eq!(
            inspector.current_workspace(root).await.as_deref(),
            Some(DEFAULT_WORKSPACE)
        );
        fs::write(root.join(".terraform/environment"), "staging\n").unwrap();
        assert_eq!(inspector.current_workspace(root).await.as_deref(), Some("staging"));
    }

    #[tokio::test]
    async fn test_invalid_lock_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE), "provider {{{").unwrap();

        let result = FsProjectInspector::new().installed_providers(dir.path()).await;
        assert!(matches!(result, Err(ToolboxError::LockFileParse { .. })));
    }

    #[tokio::test]
    async fn test_invalid_modules_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".terraform/modules")).unwrap();
        fs::write(dir.path().join(".terraform/modules/modules.json"), "{not json").unwrap();

        assert!(FsProjectInspector::new()
            .installed_modules(dir.path())
            .await
            .is_empty());
    }

    #[test]
    fn test_find_project_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for folder in ["app", "app/modules/net", "env/prod", "skipme"] {
            fs::create_dir_all(root.join(folder)).unwrap();
            fs::write(root.join(folder).join("main.tf"), "").unwrap();
        }
        fs::write(root.join("app/variables.tf"), "").unwrap();
        fs::create_dir_all(root.join("app/.terraform/modules/vpc")).unwrap();
        fs::write(root.join("app/.terraform/modules/vpc/main.tf"), "").unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/readme.md"), "").unwrap();

        let scan = ScanOptions {
            exclude_patterns: vec!["**/skipme".to_string()],
            ..ScanOptions::default()
        };
        let folders = find_project_folders(root, &scan).unwrap();

        assert_eq!(
            folders,
            vec![
                root.join("app"),
                root.join("app/modules/net"),
                root.join("env/prod"),
            ]
        );
    }

    #[test]
    fn test_find_project_folders_missing_root() {
        let result = find_project_folders(Path::new("/no/such/root"), &ScanOptions::default());
        assert!(matches!(result, Err(ToolboxError::DirectoryNotFound { .. })));
    }
}
