//! Dependency lock file (`.terraform.lock.hcl`) parsing.

use crate::error::Result;
use crate::types::LockedProvider;

use hcl::{Body, Expression};
use std::path::Path;

/// Parse the content of a dependency lock file.
///
/// Each `provider "<address>"` block becomes a [`LockedProvider`]. The
/// `constraints` attribute is split on commas so every entry holds a single
/// clause as written at the last `init`.
///
/// # Errors
///
/// Returns an error if the content is not valid HCL.
pub fn parse_lock_file(content: &str, file_path: &Path) -> Result<Vec<LockedProvider>> {
    let body: Body = hcl::from_str(content).map_err(|e| {
        crate::err!(LockFileParse {
            file: file_path.to_path_buf(),
            message: e.to_string(),
        })
    })?;

    let mut providers = Vec::new();

    for block in body.blocks().filter(|b| b.identifier.as_str() == "provider") {
        let Some(key) = block.labels.first().map(|l| l.as_str().to_string()) else {
            tracing::warn!(file = %file_path.display(), "Lock file provider block without address");
            continue;
        };

        let mut version = None;
        let mut version_constraints = Vec::new();

        for attr in block.body.attributes() {
            match (attr.key.as_str(), &attr.expr) {
                ("version", Expression::String(v)) => version = Some(v.clone()),
                ("constraints", Expression::String(c)) => {
                    version_constraints.extend(
                        c.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from),
                    );
                }
                _ => {}
            }
        }

        providers.push(LockedProvider {
            key,
            version,
            version_constraints,
        });
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolboxError;
    use pretty_assertions::assert_eq;

    const LOCK: &str = r#"
# This file is maintained automatically by "terraform init".
# Manual edits may be lost in future updates.

provider "registry.terraform.io/hashicorp/aws" {
  version     = "5.31.0"
  constraints = ">= 4.0.0, < 6.0.0"
  hashes = [
    "h1:abc=",
    "zh:def",
  ]
}

provider "registry.terraform.io/hashicorp/random" {
  version = "3.6.0"
  hashes = [
    "h1:xyz=",
  ]
}
"#;

    #[test]
    fn test_parse_lock_file() {
        let providers = parse_lock_file(LOCK, Path::new(".terraform.lock.hcl")).unwrap();

        assert_eq!(providers.len(), 2);
        assert_eq!(
            providers[0],
            LockedProvider {
                key: "registry.terraform.io/hashicorp/aws".to_string(),
                version: Some("5.31.0".to_string()),
                version_constraints: vec![">= 4.0.0".to_string(), "< 6.0.0".to_string()],
            }
        );
        assert_eq!(providers[1].name(), "random");
        assert!(providers[1].version_constraints.is_empty());
    }

    #[test]
    fn test_empty_lock_file() {
        let providers = parse_lock_file("", Path::new(".terraform.lock.hcl")).unwrap();
        assert!(providers.is_empty());
    }

    #[test]
    fn test_invalid_lock_file() {
        let result = parse_lock_file("provider {{{", Path::new(".terraform.lock.hcl"));
        assert!(matches!(result, Err(ToolboxError::LockFileParse { .. })));
    }
}
