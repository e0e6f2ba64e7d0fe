//! Configuration module for tftoolbox.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`tftoolbox.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # tftoolbox.yaml
//!
//! iac:
//!   tool: terraform        # or opentofu
//!   binary: ~/.local/bin/terraform
//!   init_args: "-upgrade"
//!
//! reconcile:
//!   enable_auto_module_fetch: true
//!   enable_auto_provider_init: true
//!   processing_delay_ms: 1000
//!   only_initialized_projects: false
//!
//! scan:
//!   exclude_patterns:
//!     - "**/.terraform/**"
//!   max_depth: 100
//! ```

use crate::error::{Result, ToolboxError};
use crate::provider::IacTool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest accepted quiet period.
pub const MAX_PROCESSING_DELAY_MS: u64 = 600_000;

/// Default configuration file names, searched in the working directory.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["tftoolbox.yaml", "tftoolbox.yml", ".tftoolbox.yaml"];

/// IaC tool options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IacOptions {
    /// Which tool drives the projects.
    pub tool: IacTool,

    /// Explicit path to the binary. Falls back to the tool's binary name on `PATH`.
    pub binary: Option<PathBuf>,

    /// Extra arguments appended to every `init`.
    pub init_args: String,
}

impl Default for IacOptions {
    fn default() -> Self {
        Self {
            tool: IacTool::Terraform,
            binary: None,
            init_args: String::new(),
        }
    }
}

/// Background reconciliation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Run `get` when a saved file declares modules.
    pub enable_auto_module_fetch: bool,

    /// Run `init` when a saved file declares providers that are not installed.
    pub enable_auto_provider_init: bool,

    /// Quiet period after the last relevant event before a pass runs.
    pub processing_delay_ms: u64,

    /// Ignore events for projects that have never been initialized.
    pub only_initialized_projects: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            enable_auto_module_fetch: true,
            enable_auto_provider_init: true,
            processing_delay_ms: default_processing_delay_ms(),
            only_initialized_projects: false,
        }
    }
}

impl ReconcileOptions {
    /// True if at least one automatic operation is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.enable_auto_module_fetch || self.enable_auto_provider_init
    }
}

/// Project discovery options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Patterns to exclude from scanning (glob patterns).
    pub exclude_patterns: Vec<String>,

    /// Maximum depth for recursive directory scanning.
    pub max_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                "**/.terraform/**".to_string(),
                "**/.terragrunt-cache/**".to_string(),
            ],
            max_depth: default_max_depth(),
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IaC tool options
    pub iac: IacOptions,

    /// Reconciliation options
    pub reconcile: ReconcileOptions,

    /// Project discovery options
    pub scan: ScanOptions,
}

fn default_max_depth() -> usize {
    100
}

fn default_processing_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded).map_err(|e| {
            ToolboxError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!())
        })?;
        config.validate()?;

        tracing::debug!(
            tool = %config.iac.tool,
            auto_init = config.reconcile.enable_auto_provider_init,
            auto_fetch = config.reconcile.enable_auto_module_fetch,
            delay_ms = config.reconcile.processing_delay_ms,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ToolboxError::io(path, e, file!(), line!()))?;
        Self::from_yaml(&content)
    }

    /// Find the configuration file to use when none was given explicitly.
    ///
    /// Looks in the working directory first, then in the user configuration
    /// directory (`~/.config/tftoolbox/config.yaml` on Linux).
    #[must_use]
    pub fn discover() -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .or_else(|| {
                dirs::config_dir()
                    .map(|d| d.join("tftoolbox").join("config.yaml"))
                    .filter(|p| p.exists())
            })
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValue` error naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.processing_delay_ms > MAX_PROCESSING_DELAY_MS {
            return Err(crate::err!(ConfigValue {
                key: "reconcile.processing_delay_ms".to_string(),
                message: format!(
                    "{} exceeds the maximum of {MAX_PROCESSING_DELAY_MS}",
                    self.reconcile.processing_delay_ms
                ),
            }));
        }
        if self
            .iac
            .binary
            .as_ref()
            .is_some_and(|b| b.as_os_str().is_empty())
        {
            return Err(crate::err!(ConfigValue {
                key: "iac.binary".to_string(),
                message: "must not be empty".to_string(),
            }));
        }
        for pattern in &self.scan.exclude_patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(crate::err!(ConfigValue {
                    key: "scan.exclude_patterns".to_string(),
                    message: format!("invalid glob '{pattern}': {e}"),
                }));
            }
        }
        Ok(())
    }

    /// The binary to invoke: the configured path or the tool's default name.
    #[must_use]
    pub fn binary(&self) -> PathBuf {
        self.iac
            .binary
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.iac.tool.provider().binary_name()))
    }

    /// Merge `watch` command flags into the configuration.
    pub fn merge_watch_args(&mut self, args: &crate::cli::WatchArgs) {
        if let Some(delay) = args.delay_ms {
            self.reconcile.processing_delay_ms = delay;
        }
        if args.no_auto_init {
            self.reconcile.enable_auto_provider_init = false;
        }
        if args.no_auto_fetch {
            self.reconcile.enable_auto_module_fetch = false;
        }
        if args.only_initialized {
            self.reconcile.only_initialized_projects = true;
        }
    }

    /// Apply global overrides shared by every command.
    pub fn merge_global_args(&mut self, tool: Option<IacTool>, binary: Option<&PathBuf>) {
        if let Some(tool) = tool {
            self.iac.tool = tool;
        }
        if let Some(binary) = binary {
            self.iac.binary = Some(binary.clone());
        }
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# tftoolbox configuration file

# IaC tool options
iac:
  # terraform or opentofu
  tool: terraform

  # Explicit binary path (default: look up "terraform"/"tofu" on PATH)
  # binary: /usr/local/bin/terraform

  # Extra arguments appended to every init
  init_args: ""

# Background reconciliation (tftoolbox watch)
reconcile:
  # Run "get" when a saved file declares modules
  enable_auto_module_fetch: true

  # Run "init" when a saved file declares providers that are not installed
  enable_auto_provider_init: true

  # Quiet period in milliseconds after the last change before work starts
  processing_delay_ms: 1000

  # Ignore projects that have never been initialized
  only_initialized_projects: false

# Project discovery
scan:
  exclude_patterns:
    - "**/.terraform/**"
    - "**/.terragrunt-cache/**"
  max_depth: 100
"#
        .to_string()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unknown variables are left untouched.
fn expand_env_vars(content: &str) -> String {
    static BRACED: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static BARE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let braced = BRACED.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").unwrap_or_else(|_| unreachable!("static regex"))
    });
    let bare = BARE.get_or_init(|| {
        regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap_or_else(|_| unreachable!("static regex"))
    });

    let replace = |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    };
    let result = braced.replace_all(content, replace);
    bare.replace_all(&result, replace).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.reconcile.enable_auto_module_fetch);
        assert!(config.reconcile.enable_auto_provider_init);
        assert!(!config.reconcile.only_initialized_projects);
        assert_eq!(config.reconcile.processing_delay_ms, 1000);
        assert_eq!(config.scan.max_depth, 100);
        assert_eq!(config.binary(), PathBuf::from("terraform"));
    }

    #[test]
    fn test_config_from_yaml_nested() {
        let yaml = r#"
iac:
  tool: opentofu
  init_args: "-upgrade"
reconcile:
  enable_auto_module_fetch: false
  processing_delay_ms: 600
scan:
  max_depth: 5
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.iac.tool, IacTool::OpenTofu);
        assert_eq!(config.iac.init_args, "-upgrade");
        assert!(!config.reconcile.enable_auto_module_fetch);
        assert!(config.reconcile.enable_auto_provider_init);
        assert_eq!(config.reconcile.processing_delay_ms, 600);
        assert_eq!(config.scan.max_depth, 5);
        assert_eq!(config.binary(), PathBuf::from("tofu"));
    }

    #[test]
    fn test_rejects_out_of_range_delay() {
        let yaml = "reconcile:\n  processing_delay_ms: 900000\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ToolboxError::ConfigValue { ref key, .. } if key == "reconcile.processing_delay_ms"));
    }

    #[test]
    fn test_rejects_invalid_glob() {
        let yaml = "scan:\n  exclude_patterns:\n    - \"[\"\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ToolboxError::ConfigValue { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_tool() {
        let yaml = "iac:\n  tool: pulumi\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ToolboxError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_env_var_expansion() {
        // Unknown variables are left as written
        let expanded = expand_env_vars("binary: ${TFTOOLBOX_SURELY_UNSET_VAR}");
        assert_eq!(expanded, "binary: ${TFTOOLBOX_SURELY_UNSET_VAR}");

        let patterns = ["no vars here", "$NOTAVAR123", "${NESTED${VAR}}", "normal = ${KEY}"];
        for pattern in patterns {
            let _ = expand_env_vars(pattern);
        }
    }

    #[test]
    fn test_example_yaml_is_valid() {
        let config = Config::from_yaml(&Config::example_yaml()).unwrap();
        assert_eq!(config.iac.tool, IacTool::Terraform);
        assert_eq!(config.reconcile.processing_delay_ms, 1000);
    }
}
