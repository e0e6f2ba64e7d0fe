//! JSON report generator.

use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::status::{ProjectStatus, StatusReport};
use serde::Serialize;

/// JSON report generator.
#[derive(Debug, Clone, Copy)]
pub struct JsonReporter {
    /// Whether to pretty-print the output
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter.
    #[must_use]
    pub const fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl ReportGenerator for JsonReporter {
    fn generate(&self, report: &StatusReport) -> Result<String> {
        let report = JsonReport::from(report);

        let json = if self.pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };

        json.map_err(|e| {
            crate::err!(Internal {
                message: format!("Failed to serialize JSON report: {e}"),
            })
        })
    }
}

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: ReportSummary,
    /// Project details
    pub projects: &'a [ProjectStatus],
}

/// Report metadata.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    /// Tool version
    pub version: String,
    /// Report timestamp
    pub timestamp: String,
    /// Scanned root
    pub root: String,
    /// IaC tool name
    pub tool: String,
}

/// Summary statistics.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    /// Number of projects
    pub total_projects: usize,
    /// Projects that ran `init`
    pub initialized: usize,
    /// Projects needing `init`
    pub needs_init: usize,
    /// Projects needing a module fetch
    pub needs_module_fetch: usize,
}

impl<'a> From<&'a StatusReport> for JsonReport<'a> {
    fn from(report: &'a StatusReport) -> Self {
        use crate::types::WorkKind;

        let count = |kind: WorkKind| {
            report
                .projects
                .iter()
                .filter(|p| p.action == Some(kind))
                .count()
        };

        Self {
            metadata: ReportMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: report.generated_at.to_rfc3339(),
                root: report.root.display().to_string(),
                tool: report.tool.clone(),
            },
            summary: ReportSummary {
                total_projects: report.projects.len(),
                initialized: report.projects.iter().filter(|p| p.initialized).count(),
                needs_init: count(WorkKind::Init),
                needs_module_fetch: count(WorkKind::ModuleFetch),
            },
            projects: &report.projects,
        }
    }
}
