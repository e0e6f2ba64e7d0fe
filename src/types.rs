//! Core data types used throughout tftoolbox.
//!
//! This module defines the fundamental data structures for representing:
//! - Resources declared in Terraform/OpenTofu configuration files
//! - Provider and module state found on disk after `init`
//! - Version constraints and ranges
//! - Outcomes of reconciliation passes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A `module` block declared in a configuration file.
///
/// # Example HCL
///
/// ```hcl
/// module "vpc" {
///   source  = "terraform-aws-modules/vpc/aws"
///   version = "~> 5.0"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredModule {
    /// The label of the module block (e.g., "vpc")
    pub key: String,

    /// The raw source string
    pub source: String,

    /// Version constraint as written, if any
    pub version: Option<String>,
}

/// A provider requirement from `terraform { required_providers { ... } }`.
///
/// # Example HCL
///
/// ```hcl
/// terraform {
///   required_providers {
///     aws = {
///       source  = "hashicorp/aws"
///       version = ">= 4.0, < 6.0"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredProvider {
    /// Local name of the provider (e.g., "aws")
    pub key: String,

    /// Provider source (e.g., "hashicorp/aws")
    pub source: Option<String>,

    /// Version constraint as written, if any
    pub version: Option<String>,
}

impl DeclaredProvider {
    /// Returns the fully qualified provider address used as key in the lock file.
    ///
    /// A `host/namespace/name` source is returned unchanged, a
    /// `namespace/name` source is prefixed with `registry_domain` and a
    /// missing source falls back to the `hashicorp` namespace.
    #[must_use]
    pub fn full_source(&self, registry_domain: &str) -> String {
        match self.source.as_deref() {
            Some(source) if source.split('/').count() == 3 => source.to_string(),
            Some(source) => format!("{registry_domain}/{source}"),
            None => format!("{registry_domain}/hashicorp/{}", self.key),
        }
    }
}

/// Everything a single configuration file declares.
///
/// Produced fresh by the parser for every file event and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredResources {
    /// Declared module blocks
    pub modules: Vec<DeclaredModule>,

    /// Declared provider requirements
    pub providers: Vec<DeclaredProvider>,

    /// `required_version` constraints
    pub required_versions: Vec<String>,
}

impl DeclaredResources {
    /// Returns true if there is nothing to reconcile (no modules and no providers).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.providers.is_empty()
    }

    /// Merge another file's declarations into this one.
    pub fn merge(&mut self, other: Self) {
        self.modules.extend(other.modules);
        self.providers.extend(other.providers);
        for version in other.required_versions {
            if !self.required_versions.contains(&version) {
                self.required_versions.push(version);
            }
        }
    }
}

/// A provider recorded in `.terraform.lock.hcl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProvider {
    /// Fully qualified address (e.g., "registry.terraform.io/hashicorp/aws")
    pub key: String,

    /// Resolved version, if recorded
    pub version: Option<String>,

    /// Constraint strings recorded at the last successful init
    pub version_constraints: Vec<String>,
}

impl LockedProvider {
    /// Registry host part of the address.
    #[must_use]
    pub fn registry_domain(&self) -> &str {
        self.key.split('/').next().unwrap_or_default()
    }

    /// Namespace part of the address.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.key.split('/').nth(1).unwrap_or_default()
    }

    /// Type name part of the address.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.split('/').nth(2).unwrap_or_default()
    }

    /// Check whether the locked version satisfies a declared constraint.
    ///
    /// No declared constraint means any locked version is fine. A missing
    /// locked version or an unparseable constraint never satisfies.
    #[must_use]
    pub fn satisfies(&self, constraint: Option<&str>) -> bool {
        let Some(version) = self.version.as_deref() else {
            return false;
        };
        let Some(constraint) = constraint else {
            return true;
        };
        match (Constraint::parse(constraint), parse_version(version)) {
            (Ok(c), Ok(v)) => c.is_satisfied_by(&v),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(key = %self.key, error = %e, "Cannot evaluate provider constraint");
                false
            }
        }
    }
}

/// A module entry from `.terraform/modules/modules.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    /// Module key (nested modules are dot separated)
    #[serde(rename = "Key")]
    pub key: String,

    /// Source the module was fetched from
    #[serde(rename = "Source", default)]
    pub source: String,

    /// Resolved version (registry modules only)
    #[serde(rename = "Version", default)]
    pub version: Option<String>,

    /// Directory the module was installed into
    #[serde(rename = "Dir", default)]
    pub dir: Option<String>,
}

/// Represents a version constraint expression.
///
/// Supports Terraform's constraint syntax:
/// - `= 1.0.0` - Exact version
/// - `!= 1.0.0` - Not equal
/// - `> 1.0.0`, `>= 1.0.0` - Greater than
/// - `< 1.0.0`, `<= 1.0.0` - Less than
/// - `~> 1.0` - Pessimistic constraint (allows rightmost version component to increment)
/// - `>= 1.0, < 2.0` - Multiple constraints (AND)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// The raw constraint string as written in HCL
    pub raw: String,

    /// Parsed version ranges
    pub ranges: Vec<VersionRange>,
}

impl Constraint {
    /// Parse a constraint string into a `Constraint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the constraint string is invalid.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let ranges = parse_constraint_string(s)?;
        Ok(Self {
            raw: s.to_string(),
            ranges,
        })
    }

    /// Check if this constraint is satisfied by a given version.
    #[must_use]
    pub fn is_satisfied_by(&self, version: &semver::Version) -> bool {
        self.ranges.iter().all(|range| range.contains(version))
    }

    /// Returns true if this constraint allows any version (no constraint).
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Represents a single version range component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionRange {
    /// Exact version match: `= X.Y.Z`
    Exact(semver::Version),
    /// Greater than: `> X.Y.Z`
    GreaterThan(semver::Version),
    /// Greater than or equal: `>= X.Y.Z`
    GreaterThanOrEqual(semver::Version),
    /// Less than: `< X.Y.Z`
    LessThan(semver::Version),
    /// Less than or equal: `<= X.Y.Z`
    LessThanOrEqual(semver::Version),
    /// Not equal: `!= X.Y.Z`
    NotEqual(semver::Version),
    /// Pessimistic constraint: `~> X.Y`
    Pessimistic {
        /// The version specified in the constraint
        version: semver::Version,
        /// Number of version components specified (1=X, 2=X.Y, 3=X.Y.Z)
        parts: usize,
    },
}

impl VersionRange {
    /// Check if a version satisfies this range.
    #[must_use]
    pub fn contains(&self, version: &semver::Version) -> bool {
        match self {
            Self::Exact(v) => version == v,
            Self::GreaterThan(v) => version > v,
            Self::GreaterThanOrEqual(v) => version >= v,
            Self::LessThan(v) => version < v,
            Self::LessThanOrEqual(v) => version <= v,
            Self::NotEqual(v) => version != v,
            Self::Pessimistic { version: v, parts } => {
                // ~> X.Y.Z allows >= X.Y.Z and < X.(Y+1).0
                // ~> X.Y allows >= X.Y.0 and < (X+1).0.0
                match pessimistic_upper_bound(v, *parts) {
                    Some(upper) => version >= v && version < &upper,
                    None => version >= v,
                }
            }
        }
    }
}

/// Parse a constraint string into version ranges.
fn parse_constraint_string(s: &str) -> crate::Result<Vec<VersionRange>> {
    let mut ranges = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        ranges.push(parse_single_constraint(part)?);
    }

    Ok(ranges)
}

/// Parse a single constraint expression.
fn parse_single_constraint(s: &str) -> crate::Result<VersionRange> {
    let s = s.trim();

    if let Some(version_str) = s.strip_prefix("~>") {
        let version_str = version_str.trim();
        let version = parse_version(version_str)?;
        let parts = version_str.matches('.').count() + 1;
        return Ok(VersionRange::Pessimistic { version, parts });
    }

    if let Some(version_str) = s.strip_prefix("!=") {
        return Ok(VersionRange::NotEqual(parse_version(version_str.trim())?));
    }

    if let Some(version_str) = s.strip_prefix(">=") {
        return Ok(VersionRange::GreaterThanOrEqual(parse_version(version_str.trim())?));
    }

    if let Some(version_str) = s.strip_prefix("<=") {
        return Ok(VersionRange::LessThanOrEqual(parse_version(version_str.trim())?));
    }

    if let Some(version_str) = s.strip_prefix('>') {
        return Ok(VersionRange::GreaterThan(parse_version(version_str.trim())?));
    }

    if let Some(version_str) = s.strip_prefix('<') {
        return Ok(VersionRange::LessThan(parse_version(version_str.trim())?));
    }

    if s.starts_with(['^', '*', 'x']) {
        return Err(crate::err!(ConstraintParse {
            constraint: s.to_string(),
            message: "unsupported operator".to_string(),
        }));
    }

    // Exact (with or without = prefix)
    let version_str = s.strip_prefix('=').unwrap_or(s).trim();
    Ok(VersionRange::Exact(parse_version(version_str)?))
}

/// Parse a version string, completing partial versions like `5.0` or `5`.
pub(crate) fn parse_version(s: &str) -> crate::Result<semver::Version> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    // Only the release part decides how many components are present
    let release_len = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (release, suffix) = trimmed.split_at(release_len);
    let normalized = match release.matches('.').count() {
        0 => format!("{release}.0.0{suffix}"),
        1 => format!("{release}.0{suffix}"),
        _ => trimmed.to_string(),
    };

    semver::Version::parse(&normalized).map_err(|e| {
        crate::err!(VersionParse {
            version: s.to_string(),
            source: e,
        })
    })
}

/// Calculate the exclusive upper bound for a pessimistic constraint.
fn pessimistic_upper_bound(v: &semver::Version, parts: usize) -> Option<semver::Version> {
    match parts {
        3 => Some(semver::Version::new(v.major, v.minor + 1, 0)),
        2 => Some(semver::Version::new(v.major + 1, 0, 0)),
        // ~> X lets every component move
        _ => None,
    }
}

/// Output of one invocation of the IaC binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Convenience constructor for an unsuccessful run that never produced output.
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// The kind of reconciliation work a project needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkKind {
    /// Providers missing or outdated; run `init`
    Init,
    /// Modules declared; run `get`
    ModuleFetch,
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::ModuleFetch => write!(f, "get"),
        }
    }
}

/// Result of the work attempted for a single project during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOutcome {
    /// Project directory
    pub dir: PathBuf,
    /// The operation that was attempted
    pub kind: WorkKind,
    /// What the binary reported
    pub output: CommandOutput,
}

impl ProjectOutcome {
    /// Whether the operation succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.output.success
    }
}

/// Summary of a single execution pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassReport {
    /// Sequence stamp the pass was armed with
    pub sequence: u64,
    /// True if a newer event superseded this pass and it did nothing
    pub skipped_stale: bool,
    /// Outcomes of `init` operations
    pub init: Vec<ProjectOutcome>,
    /// Outcomes of module fetch operations
    pub fetch: Vec<ProjectOutcome>,
    /// When the pass started doing work
    pub started_at: Option<DateTime<Utc>>,
}

impl PassReport {
    /// A pass that was superseded by a newer event.
    #[must_use]
    pub fn stale(sequence: u64) -> Self {
        Self {
            sequence,
            skipped_stale: true,
            ..Self::default()
        }
    }

    /// Number of failed project operations.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.init
            .iter()
            .chain(&self.fetch)
            .filter(|o| !o.succeeded())
            .count()
    }

    /// Returns true if the pass touched no project.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.init.is_empty() && self.fetch.is_empty()
    }
}

/// Output format for the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ReportFormat {
    /// Plain text table
    #[default]
    Text,
    /// JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(s: &str) -> semver::Version {
        semver::Version::parse(s).unwrap()
    }

    #[test_case(">= 5.0", "5.31.0", true; "greater or equal")]
    #[test_case(">= 5.0", "4.67.0", false; "below lower bound")]
    #[test_case("~> 5.0", "5.99.1", true; "pessimistic minor")]
    #[test_case("~> 5.0", "6.0.0", false; "pessimistic major bump")]
    #[test_case("~> 5.1.0", "5.1.9", true; "pessimistic patch")]
    #[test_case("~> 5.1.0", "5.2.0", false; "pessimistic patch bound")]
    #[test_case(">= 4.0, < 6.0", "5.0.0", true; "range")]
    #[test_case(">= 4.0, < 6.0", "6.0.0", false; "range upper")]
    #[test_case("!= 3.1.0", "3.1.0", false; "not equal")]
    #[test_case("3.1.0", "3.1.0", true; "bare exact")]
    #[test_case("= 3.1", "3.1.0", true; "exact partial")]
    fn test_constraint_satisfaction(constraint: &str, version: &str, expected: bool) {
        let c = Constraint::parse(constraint).unwrap();
        assert_eq!(c.is_satisfied_by(&v(version)), expected);
    }

    #[test]
    fn test_parse_partial_and_prefixed_versions() {
        assert_eq!(parse_version("5").unwrap(), v("5.0.0"));
        assert_eq!(parse_version("5.1").unwrap(), v("5.1.0"));
        assert_eq!(parse_version("v1.2.3").unwrap(), v("1.2.3"));
        assert_eq!(parse_version("1.0-beta").unwrap(), v("1.0.0-beta"));
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_unsupported_operator_is_an_error() {
        assert!(Constraint::parse("^1.0").is_err());
        assert!(Constraint::parse("").unwrap().is_unconstrained());
    }

    #[test]
    fn test_full_source() {
        let domain = "registry.terraform.io";
        let with_ns = DeclaredProvider {
            key: "aws".to_string(),
            source: Some("hashicorp/aws".to_string()),
            version: None,
        };
        assert_eq!(with_ns.full_source(domain), "registry.terraform.io/hashicorp/aws");

        let qualified = DeclaredProvider {
            key: "foo".to_string(),
            source: Some("example.com/acme/foo".to_string()),
            version: None,
        };
        assert_eq!(qualified.full_source(domain), "example.com/acme/foo");

        let implicit = DeclaredProvider {
            key: "random".to_string(),
            source: None,
            version: None,
        };
        assert_eq!(implicit.full_source(domain), "registry.terraform.io/hashicorp/random");
    }

    #[test]
    fn test_locked_provider_satisfies() {
        let locked = LockedProvider {
            key: "registry.terraform.io/hashicorp/aws".to_string(),
            version: Some("5.31.0".to_string()),
            version_constraints: vec![">= 5.0".to_string()],
        };
        assert_eq!(locked.registry_domain(), "registry.terraform.io");
        assert_eq!(locked.namespace(), "hashicorp");
        assert_eq!(locked.name(), "aws");
        assert!(locked.satisfies(Some(">= 5.0")));
        assert!(locked.satisfies(None));
        assert!(!locked.satisfies(Some("~> 4.0")));
        assert!(!locked.satisfies(Some("not a constraint")));

        let unresolved = LockedProvider {
            version: None,
            ..locked
        };
        assert!(!unresolved.satisfies(None));
    }

    #[test]
    fn test_merge_deduplicates_required_versions() {
        let mut a = DeclaredResources {
            required_versions: vec![">= 1.5".to_string()],
            ..Default::default()
        };
        a.merge(DeclaredResources {
            modules: vec![DeclaredModule {
                key: "vpc".to_string(),
                source: "terraform-aws-modules/vpc/aws".to_string(),
                version: None,
            }],
            required_versions: vec![">= 1.5".to_string(), "< 2.0".to_string()],
            ..Default::default()
        });
        assert_eq!(a.required_versions, vec![">= 1.5", "< 2.0"]);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_pass_report_failure_count() {
        let ok = ProjectOutcome {
            dir: PathBuf::from("a"),
            kind: WorkKind::Init,
            output: CommandOutput {
                success: true,
                ..Default::default()
            },
        };
        let failed = ProjectOutcome {
            dir: PathBuf::from("b"),
            kind: WorkKind::ModuleFetch,
            output: CommandOutput::failed("boom"),
        };
        let report = PassReport {
            sequence: 3,
            init: vec![ok],
            fetch: vec![failed],
            ..Default::default()
        };
        assert_eq!(report.failure_count(), 1);
        assert!(!report.is_empty());
        assert!(PassReport::stale(2).skipped_stale);
    }
}
