//! Point-in-time status of every project below a root directory.

use crate::config::Config;
use crate::error::Result;
use crate::parser::HclConfigParser;
use crate::project::{find_project_folders, FsProjectInspector, ProjectInspector};
use crate::reconcile::providers_satisfied;
use crate::types::WorkKind;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Status of a single project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStatus {
    /// Project directory
    pub dir: PathBuf,
    /// Whether `init` has run
    pub initialized: bool,
    /// Selected workspace (initialized projects only)
    pub workspace: Option<String>,
    /// Number of declared provider requirements
    pub providers_declared: usize,
    /// Whether all declared providers are installed; `None` if undecidable
    pub providers_satisfied: Option<bool>,
    /// Number of declared module blocks
    pub modules_declared: usize,
    /// Number of modules in the module manifest (root module excluded)
    pub modules_installed: usize,
    /// What automatic reconciliation would do for this project
    pub action: Option<WorkKind>,
}

/// Status of all projects below a root.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Scanned root
    pub root: PathBuf,
    /// Tool the projects were checked against
    pub tool: String,
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// One entry per project folder
    pub projects: Vec<ProjectStatus>,
}

impl StatusReport {
    /// Projects that need an automatic operation.
    pub fn needing_action(&self) -> impl Iterator<Item = &ProjectStatus> {
        self.projects.iter().filter(|p| p.action.is_some())
    }
}

/// Inspect every project folder below `root`.
///
/// # Errors
///
/// Returns an error if `root` cannot be scanned.
pub async fn collect_status(root: &Path, config: &Config) -> Result<StatusReport> {
    let folders = find_project_folders(root, &config.scan)?;
    let parser = HclConfigParser::new();
    let inspector = FsProjectInspector::new();
    let registry_domain = config.iac.tool.provider().registry_domain();

    let mut projects = Vec::with_capacity(folders.len());
    for dir in folders {
        projects.push(project_status(&parser, &inspector, registry_domain, dir).await);
    }

    Ok(StatusReport {
        root: root.to_path_buf(),
        tool: config.iac.tool.provider().name().to_string(),
        generated_at: Utc::now(),
        projects,
    })
}

async fn project_status(
    parser: &HclConfigParser,
    inspector: &FsProjectInspector,
    registry_domain: &str,
    dir: PathBuf,
) -> ProjectStatus {
    let declared = match parser.parse_directory(&dir).await {
        Ok(declared) => declared,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not parse project");
            Default::default()
        }
    };

    let initialized = inspector.is_initialized(&dir).await;
    let workspace = inspector.current_workspace(&dir).await;
    let installed_modules = inspector.installed_modules(&dir).await;

    let satisfied = if declared.providers.is_empty() {
        None
    } else {
        match providers_satisfied(inspector, registry_domain, &dir, &declared.providers).await {
            Ok(satisfied) => Some(satisfied),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Could not inspect providers");
                None
            }
        }
    };

    let installed_keys: HashSet<&str> = installed_modules.iter().map(|m| m.key.as_str()).collect();
    let modules_missing = declared
        .modules
        .iter()
        .any(|m| !installed_keys.contains(m.key.as_str()));

    let action = if satisfied == Some(false) {
        Some(WorkKind::Init)
    } else if modules_missing {
        Some(WorkKind::ModuleFetch)
    } else {
        None
    };

    ProjectStatus {
        dir,
        initialized,
        workspace,
        providers_declared: declared.providers.len(),
        providers_satisfied: satisfied,
        modules_declared: declared.modules.len(),
        modules_installed: installed_modules.iter().filter(|m| !m.key.is_empty()).count(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_collect_status() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        // needs init: provider declared, nothing installed
        fs::create_dir_all(root.join("network")).unwrap();
        fs::write(
            root.join("network/versions.tf"),
            "terraform {\n  required_providers {\n    aws = {\n      source = \"hashicorp/aws\"\n      version = \">= 5.0\"\n    }\n  }\n}\n",
        )
        .unwrap();

        // needs module fetch: initialized, module not installed yet
        fs::create_dir_all(root.join("app/.terraform")).unwrap();
        fs::write(
            root.join("app/main.tf"),
            "module \"web\" {\n  source = \"./modules/web\"\n}\n",
        )
        .unwrap();

        // nothing to do
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/outputs.tf"), "output \"x\" {\n  value = 1\n}\n").unwrap();

        let report = collect_status(root, &Config::default()).await.unwrap();
        assert_eq!(report.projects.len(), 3);

        let by_name = |name: &str| {
            report
                .projects
                .iter()
                .find(|p| p.dir == root.join(name))
                .unwrap()
                .clone()
        };

        let network = by_name("network");
        assert!(!network.initialized);
        assert_eq!(network.providers_satisfied, Some(false));
        assert_eq!(network.action, Some(WorkKind::Init));

        let app = by_name("app");
        assert!(app.initialized);
        assert_eq!(app.workspace.as_deref(), Some("default"));
        assert_eq!(app.action, Some(WorkKind::ModuleFetch));

        let docs = by_name("docs");
        assert_eq!(docs.providers_satisfied, None);
        assert_eq!(docs.action, None);

        assert_eq!(report.needing_action().count(), 2);
    }
}
