//! HCL file parser implementation.
//!
//! This module provides the configuration parsing using the `hcl-rs` crate.

use crate::error::{Result, ToolboxError};
use crate::parser::{is_config_file, ConfigFileParser};
use crate::types::{DeclaredModule, DeclaredProvider, DeclaredResources};

use async_trait::async_trait;
use hcl::{Block, Body, Expression};
use std::path::Path;

/// HCL parser for Terraform/OpenTofu files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HclConfigParser;

impl HclConfigParser {
    /// Create a new HCL parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse a single configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid HCL.
    pub async fn parse_file(&self, path: &Path) -> Result<DeclaredResources> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ToolboxError::io(path, e, file!(), line!()))?;

        self.parse_content(&content, path)
    }

    /// Parse configuration file content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid HCL.
    pub fn parse_content(&self, content: &str, file_path: &Path) -> Result<DeclaredResources> {
        let body: Body = hcl::from_str(content).map_err(|e| {
            crate::err!(HclParse {
                file: file_path.to_path_buf(),
                message: e.to_string(),
            })
        })?;

        let mut result = DeclaredResources::default();

        for block in body.blocks() {
            match block.identifier.as_str() {
                "module" => {
                    if let Some(module) = parse_module_block(block, file_path) {
                        result.modules.push(module);
                    }
                }
                "terraform" => {
                    let (providers, required_versions) = parse_terraform_block(block);
                    result.providers.extend(providers);
                    result.required_versions.extend(required_versions);
                }
                _ => {
                    // resource, data, variable, ... are irrelevant here
                }
            }
        }

        Ok(result)
    }

    /// Aggregate the resources of every configuration file directly inside `dir`.
    ///
    /// Files that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub async fn parse_directory(&self, dir: &Path) -> Result<DeclaredResources> {
        if !dir.is_dir() {
            return Err(crate::err!(DirectoryNotFound {
                path: dir.to_path_buf(),
            }));
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ToolboxError::io(dir, e, file!(), line!()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ToolboxError::io(dir, e, file!(), line!()))?
        {
            let path = entry.path();
            if path.is_file() && is_config_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        let mut result = DeclaredResources::default();
        for file in &files {
            match self.parse_file(file).await {
                Ok(parsed) => result.merge(parsed),
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Failed to parse file, skipping");
                }
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            files = files.len(),
            modules = result.modules.len(),
            providers = result.providers.len(),
            "Parsed project directory"
        );

        Ok(result)
    }
}

#[async_trait]
impl ConfigFileParser for HclConfigParser {
    async fn parse(&self, path: &Path) -> Option<DeclaredResources> {
        match self.parse_file(path).await {
            Ok(resources) => Some(resources),
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "Could not parse configuration file");
                None
            }
        }
    }
}

/// Parse a module block into a `DeclaredModule`.
fn parse_module_block(block: &Block, file_path: &Path) -> Option<DeclaredModule> {
    let key = block
        .labels
        .first()
        .map_or_else(|| "unnamed".to_string(), |l| l.as_str().to_string());

    let Some(source) = get_string_attribute(&block.body, "source") else {
        tracing::warn!(
            module = %key,
            file = %file_path.display(),
            "Module block missing source attribute"
        );
        return None;
    };

    Some(DeclaredModule {
        key,
        source,
        version: get_string_attribute(&block.body, "version"),
    })
}

/// Parse a terraform block for `required_providers` and `required_version`.
fn parse_terraform_block(block: &Block) -> (Vec<DeclaredProvider>, Vec<String>) {
    let mut providers = Vec::new();
    let mut required_versions = Vec::new();

    if let Some(version) = get_string_attribute(&block.body, "required_version") {
        required_versions.push(version);
    }

    for nested in block
        .body
        .blocks()
        .filter(|b| b.identifier.as_str() == "required_providers")
    {
        for attr in nested.body.attributes() {
            let (source, version) = parse_provider_requirement(&attr.expr);
            providers.push(DeclaredProvider {
                key: attr.key.as_str().to_string(),
                source,
                version,
            });
        }
    }

    (providers, required_versions)
}

/// Parse a provider requirement expression.
fn parse_provider_requirement(expr: &Expression) -> (Option<String>, Option<String>) {
    match expr {
        // Legacy (pre 0.13) form:
        //   aws = ">= 4.0"
        Expression::String(version) => (None, Some(version.clone())),

        // Object with source and version
        Expression::Object(obj) => {
            let mut source = None;
            let mut version = None;

            for (key, value) in obj {
                match object_key_to_string(key).as_str() {
                    "source" => source = expression_to_string(value),
                    "version" => version = expression_to_string(value),
                    _ => {
                        // configuration_aliases and friends
                    }
                }
            }

            (source, version)
        }

        _ => (None, None),
    }
}

/// Get a string attribute from a body.
fn get_string_attribute(body: &Body, key: &str) -> Option<String> {
    body.attributes()
        .find(|attr| attr.key.as_str() == key)
        .and_then(|attr| expression_to_string(&attr.expr))
}

/// Convert an expression to a string if possible.
fn expression_to_string(expr: &Expression) -> Option<String> {
    match expr {
        Expression::String(s) => Some(s.clone()),
        Expression::Number(n) => Some(n.to_string()),
        Expression::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert an object key to a string.
fn object_key_to_string(key: &hcl::ObjectKey) -> String {
    match key {
        hcl::ObjectKey::Identifier(id) => id.as_str().to_string(),
        hcl::ObjectKey::Expression(expr) => expression_to_string(expr).unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> DeclaredResources {
        HclConfigParser::new()
            .parse_content(content, Path::new("test.tf"))
            .unwrap()
    }

    #[test]
    fn test_parse_simple_module() {
        let result = parse(
            r#"
module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "~> 5.0"

  name = "my-vpc"
  cidr = "10.0.0.0/16"
}
"#,
        );

        assert_eq!(
            result.modules,
            vec![DeclaredModule {
                key: "vpc".to_string(),
                source: "terraform-aws-modules/vpc/aws".to_string(),
                version: Some("~> 5.0".to_string()),
            }]
        );
        assert!(result.providers.is_empty());
    }

    #[test]
    fn test_parse_local_module_without_version() {
        let result = parse(
            r#"
module "local" {
  source = "../modules/vpc"
}
"#,
        );

        assert_eq!(result.modules.len(), 1);
        assert!(result.modules[0].version.is_none());
    }

    #[test]
    fn test_module_without_source_is_ignored() {
        let result = parse(
            r#"
module "broken" {
  version = "1.0.0"
}
"#,
        );
        assert!(result.modules.is_empty());
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_required_providers() {
        let result = parse(
            r#"
terraform {
  required_version = ">= 1.5.0"

  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = ">= 4.0, < 6.0"
    }
    random = {
      source  = "hashicorp/random"
      version = "~> 3.0"
    }
  }
}
"#,
        );

        assert_eq!(result.providers.len(), 2);
        let aws = result.providers.iter().find(|p| p.key == "aws").unwrap();
        assert_eq!(aws.source.as_deref(), Some("hashicorp/aws"));
        assert_eq!(aws.version.as_deref(), Some(">= 4.0, < 6.0"));
        assert_eq!(result.required_versions, vec![">= 1.5.0".to_string()]);
    }

    #[test]
    fn test_parse_legacy_provider_string() {
        let result = parse(
            r#"
terraform {
  required_providers {
    aws = ">= 4.0"
  }
}
"#,
        );

        assert_eq!(
            result.providers,
            vec![DeclaredProvider {
                key: "aws".to_string(),
                source: None,
                version: Some(">= 4.0".to_string()),
            }]
        );
    }

    #[test]
    fn test_resources_only_file_is_empty() {
        let result = parse(
            r#"
resource "aws_s3_bucket" "logs" {
  bucket = "logs"
}

variable "region" {
  default = "eu-west-1"
}
"#,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_invalid_hcl() {
        let result = HclConfigParser::new().parse_content("this is not valid { hcl", Path::new("test.tf"));
        assert!(matches!(result, Err(ToolboxError::HclParse { .. })));
    }

    #[tokio::test]
    async fn test_parse_missing_file_yields_none() {
        let parser = HclConfigParser::new();
        assert!(parser.parse(Path::new("/definitely/not/here/main.tf")).await.is_none());
    }

    #[tokio::test]
    async fn test_parse_directory_aggregates_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("versions.tf"),
            "terraform {\n  required_version = \">= 1.5\"\n  required_providers {\n    aws = {\n      source = \"hashicorp/aws\"\n    }\n  }\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("main.tf"),
            "module \"vpc\" {\n  source = \"terraform-aws-modules/vpc/aws\"\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.tf"), "not { valid").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("main.tf"),
            "module \"ignored\" {\n  source = \"./x\"\n}\n",
        )
        .unwrap();

        let result = HclConfigParser::new()
            .parse_directory(dir.path())
            .await
            .unwrap();
        assert_eq!(result.modules.len(), 1);
        assert_eq!(result.providers.len(), 1);
        assert_eq!(result.required_versions, vec![">= 1.5".to_string()]);
    }
}
