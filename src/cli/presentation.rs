//! Text presentation for CLI results: comfy-table listings and styled headings.

use crate::api::IntegrityAudit;
use crate::branch::BranchPoint;
use crate::experiment::{Experiment, ExperimentSummary};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_summaries_table(summaries: &[ExperimentSummary]) -> String {
    if summaries.is_empty() {
        return "No experiments yet.\n\nUse 'arbor start --image <file>' to create one.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Name", "Steps", "Created"]);
    for summary in summaries {
        table.add_row(vec![
            summary.id.to_string(),
            summary.name.clone(),
            summary.step_count.to_string(),
            summary.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    format!("{}\n\nTotal: {} experiment(s)", table, summaries.len())
}

pub fn format_experiment_text(experiment: &Experiment) -> String {
    let mut out = format!("{}\n", format_section_heading(&experiment.name));
    out.push_str(&format!("  ID: {}\n", experiment.id));
    out.push_str(&format!(
        "  Created: {}\n\n",
        experiment.created_at.to_rfc3339()
    ));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Step", "Parent", "Prompt", "Image"]);
    for step in &experiment.steps {
        table.add_row(vec![
            step.index.to_string(),
            step.parent_index
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            step.prompt.clone().unwrap_or_else(|| "(root)".to_string()),
            step.image_ref.clone(),
        ]);
    }
    out.push_str(&table.to_string());
    out
}

pub fn format_branch_point_text(point: &BranchPoint) -> String {
    let mut out = format!(
        "Branch from step {} of experiment {}\n",
        point.index, point.experiment_id
    );
    out.push_str(&format!("  Image: {}\n", point.step.image_ref));
    if let Some(prompt) = &point.step.prompt {
        out.push_str(&format!("  Prompt: {}\n", prompt));
    }
    out
}

pub fn format_validation_report(audit: &IntegrityAudit) -> String {
    if audit.is_clean() {
        return format!(
            "{} {} experiment(s) checked, all lineages sound",
            "✓".green(),
            audit.checked
        );
    }
    let mut out = format!(
        "{} {} of {} experiment(s) have integrity violations\n",
        "✗".red(),
        audit.reports.len(),
        audit.checked
    );
    for report in &audit.reports {
        out.push_str(&format!("\n  {}\n", report.experiment_id.yellow()));
        for violation in &report.violations {
            out.push_str(&format!("    - {}\n", violation));
        }
    }
    out
}
