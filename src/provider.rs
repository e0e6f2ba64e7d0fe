//! IaC tool implementations.
//!
//! Terraform and OpenTofu share the same command line and on-disk layout but
//! differ in binary name, provider registry and release location. Each tool
//! implements [`IacProvider`]; the configured [`IacTool`] selects one at startup.

use serde::{Deserialize, Serialize};

/// Capabilities that differ between Terraform-compatible tools.
pub trait IacProvider: Send + Sync {
    /// Human readable tool name.
    fn name(&self) -> &'static str;

    /// Name of the executable on `PATH`.
    fn binary_name(&self) -> &'static str;

    /// Default provider registry host, used to qualify `namespace/name` sources.
    fn registry_domain(&self) -> &'static str;

    /// GitHub organization publishing releases.
    fn github_organization(&self) -> &'static str;

    /// GitHub repository publishing releases.
    fn github_repository(&self) -> &'static str;

    /// Download URL of a release artifact.
    fn release_download_url(&self, version: &str, file_name: &str) -> String;
}

/// Terraform by HashiCorp.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformProvider;

impl IacProvider for TerraformProvider {
    fn name(&self) -> &'static str {
        "Terraform"
    }

    fn binary_name(&self) -> &'static str {
        "terraform"
    }

    fn registry_domain(&self) -> &'static str {
        "registry.terraform.io"
    }

    fn github_organization(&self) -> &'static str {
        "hashicorp"
    }

    fn github_repository(&self) -> &'static str {
        "terraform"
    }

    fn release_download_url(&self, version: &str, file_name: &str) -> String {
        let version = version.trim_start_matches('v');
        format!("https://releases.hashicorp.com/terraform/{version}/{file_name}")
    }
}

/// OpenTofu.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenTofuProvider;

impl IacProvider for OpenTofuProvider {
    fn name(&self) -> &'static str {
        "OpenTofu"
    }

    fn binary_name(&self) -> &'static str {
        "tofu"
    }

    fn registry_domain(&self) -> &'static str {
        "registry.opentofu.org"
    }

    fn github_organization(&self) -> &'static str {
        "opentofu"
    }

    fn github_repository(&self) -> &'static str {
        "opentofu"
    }

    fn release_download_url(&self, version: &str, file_name: &str) -> String {
        let version = version.trim_start_matches('v');
        format!(
            "https://github.com/{}/{}/releases/download/v{version}/{file_name}",
            self.github_organization(),
            self.github_repository()
        )
    }
}

/// Tool selection as written in configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum IacTool {
    /// Terraform
    #[default]
    Terraform,
    /// OpenTofu
    #[serde(alias = "tofu")]
    #[value(name = "opentofu", alias = "tofu")]
    OpenTofu,
}

impl IacTool {
    /// The provider strategy for this tool.
    #[must_use]
    pub fn provider(self) -> &'static dyn IacProvider {
        match self {
            Self::Terraform => &TerraformProvider,
            Self::OpenTofu => &OpenTofuProvider,
        }
    }
}

impl std::fmt::Display for IacTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terraform => write!(f, "terraform"),
            Self::OpenTofu => write!(f, "opentofu"),
        }
    }
}
