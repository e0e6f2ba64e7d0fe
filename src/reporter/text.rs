//! Plain text report generator.

use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::status::{ProjectStatus, StatusReport};
use crate::types::WorkKind;
use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::Path;

/// Text report generator for CLI output.
#[derive(Debug, Clone, Copy)]
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub const fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }
}

impl ReportGenerator for TextReporter {
    fn generate(&self, report: &StatusReport) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header(report));
        output.push('\n');

        if report.projects.is_empty() {
            output.push_str("  No projects found\n");
            return Ok(output);
        }

        output.push_str(&self.format_projects(report));
        output.push('\n');
        output.push_str(&self.format_footer(report));

        Ok(output)
    }
}

impl TextReporter {
    fn format_header(&self, report: &StatusReport) -> String {
        let title = format!("{} projects", report.tool);
        let root = report.root.display().to_string();

        if self.use_colors {
            format!(
                "\n{} {}\n{}\n",
                title.bright_white().bold(),
                format!("({root})").dimmed(),
                "=".repeat(80).bright_blue(),
            )
        } else {
            format!("\n{title} ({root})\n{}\n", "=".repeat(80))
        }
    }

    fn format_projects(&self, report: &StatusReport) -> String {
        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                "Project",
                "Initialized",
                "Workspace",
                "Providers",
                "Modules",
                "Action",
            ]);

        for project in &report.projects {
            self.add_project_row(&mut table, &report.root, project);
        }

        table.to_string()
    }

    fn add_project_row(&self, table: &mut Table, root: &Path, project: &ProjectStatus) {
        let name = project
            .dir
            .strip_prefix(root)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| ".".to_string(), |p| p.display().to_string());

        let initialized = if project.initialized { "yes" } else { "no" };

        let providers = match project.providers_satisfied {
            None if project.providers_declared == 0 => "-".to_string(),
            None => format!("{} (unknown)", project.providers_declared),
            Some(true) => format!("{} ok", project.providers_declared),
            Some(false) => format!("{} missing", project.providers_declared),
        };

        let modules = if project.modules_declared == 0 {
            "-".to_string()
        } else {
            format!("{}/{}", project.modules_installed, project.modules_declared)
        };

        let (action, color) = match project.action {
            Some(WorkKind::Init) => ("init", Color::Red),
            Some(WorkKind::ModuleFetch) => ("get", Color::Yellow),
            None => ("up to date", Color::Green),
        };
        let action = if self.use_colors {
            Cell::new(action).fg(color)
        } else {
            Cell::new(action)
        };

        table.add_row(vec![
            Cell::new(name),
            Cell::new(initialized),
            Cell::new(project.workspace.as_deref().unwrap_or("-")),
            Cell::new(providers),
            Cell::new(modules),
            action,
        ]);
    }

    fn format_footer(&self, report: &StatusReport) -> String {
        let total = report.projects.len();
        let pending = report.needing_action().count();
        let summary = format!("{total} projects, {pending} need attention");

        if !self.use_colors {
            return format!("{summary}\n");
        }
        if pending == 0 {
            format!("{}\n", summary.green())
        } else {
            format!("{}\n", summary.yellow().bold())
        }
    }
}
