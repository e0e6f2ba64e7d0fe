//! Report generation module.
//!
//! This module renders a [`StatusReport`] in multiple formats:
//! - JSON: Machine-readable structured output
//! - Text: Human-readable CLI output
//!
//! # Example
//!
//! ```rust,no_run
//! use tftoolbox::reporter::Reporter;
//! use tftoolbox::status::collect_status;
//! use tftoolbox::{Config, ReportFormat};
//! use std::path::Path;
//!
//! # async fn example() -> tftoolbox::Result<()> {
//! let config = Config::default();
//! let report = collect_status(Path::new("."), &config).await?;
//! println!("{}", Reporter::new(true).generate(&report, ReportFormat::Text)?);
//! # Ok(())
//! # }
//! ```

mod json;
mod text;

use crate::error::Result;
use crate::status::StatusReport;
use crate::types::ReportFormat;

pub use json::JsonReporter;
pub use text::TextReporter;

/// Report generator that supports multiple output formats.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    use_colors: bool,
}

impl Reporter {
    /// Create a new reporter.
    #[must_use]
    pub const fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate(&self, report: &StatusReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => JsonReporter::new(true).generate(report),
            ReportFormat::Text => TextReporter::new(self.use_colors).generate(report),
        }
    }
}

/// Trait for report generators.
pub trait ReportGenerator {
    /// Generate a report from project status.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, report: &StatusReport) -> Result<String>;
}
