use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::config::OutputConfig;
use crate::models::{HandlerId, HandlerResult};
use crate::orchestrator::LoopResult;

use super::RecordWriter;

pub const RECORD_FILE: &str = "record.json";
pub const REPORT_FILE: &str = "report.md";

/// Writes `record.json` and `report.md` into `<runs_dir>/<slug>/`
pub struct FileOutputWriter {
    config: OutputConfig,
}

impl FileOutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    async fn ensure_run_dir(&self, slug: &str) -> Result<PathBuf> {
        let dir = self.config.runs_dir.join(slug);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create run directory {:?}", dir))?;
        Ok(dir)
    }
}

#[async_trait]
impl RecordWriter for FileOutputWriter {
    async fn write_run(&self, result: &LoopResult, slug: &str) -> Result<PathBuf> {
        let dir = self.ensure_run_dir(slug).await?;

        let record_path = dir.join(RECORD_FILE);
        let json = serde_json::to_string_pretty(&result.record)?;
        fs::write(&record_path, json)
            .await
            .context("Failed to write record")?;
        info!("Wrote {:?}", record_path);

        let report_path = dir.join(REPORT_FILE);
        fs::write(&report_path, render_report(result))
            .await
            .context("Failed to write report")?;
        info!("Wrote {:?}", report_path);

        Ok(dir)
    }
}

// ============================================================================
// Markdown rendering
// ============================================================================

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown for one handler's result.
pub fn format_handler_output(result: &HandlerResult) -> String {
    let mut parts = Vec::new();

    match result {
        HandlerResult::Writing { text } => parts.push(text.clone()),
        HandlerResult::Code(out) => {
            parts.push(format!(
                "**Code ({lang}):**\n```{lang}\n{code}\n```",
                lang = out.language,
                code = out.code
            ));
            if !out.explanation.is_empty() {
                parts.push(format!("**Explanation:** {}", out.explanation));
            }
            if !out.usage_example.is_empty() {
                parts.push(format!(
                    "**Usage:**\n```{}\n{}\n```",
                    out.language, out.usage_example
                ));
            }
            if !out.dependencies.is_empty() {
                parts.push(format!("**Dependencies:** {}", out.dependencies.join(", ")));
            }
        }
        HandlerResult::Research(out) => {
            if !out.query.is_empty() {
                parts.push(format!("**Query:** {}", out.query));
            }
            parts.push(format!("**Findings:**\n{}", out.findings));
            if !out.sources.is_empty() {
                parts.push(format!("**Sources:**\n{}", bullet_list(&out.sources)));
            }
            parts.push(format!("**Confidence:** {:.0}%", out.confidence * 100.0));
            if !out.limitations.is_empty() {
                parts.push(format!("**Limitations:**\n{}", bullet_list(&out.limitations)));
            }
        }
        HandlerResult::Data(out) => {
            parts.push(format!("**Analysis Type:** {}", out.analysis_type));
            let results = serde_json::to_string_pretty(&out.results)
                .unwrap_or_else(|_| out.results.to_string());
            parts.push(format!("**Results:**\n```json\n{}\n```", results));
            if !out.insights.is_empty() {
                parts.push(format!("**Insights:**\n{}", bullet_list(&out.insights)));
            }
            if !out.visualizations.is_empty() {
                parts.push(format!(
                    "**Suggested Visualizations:**\n{}",
                    bullet_list(&out.visualizations)
                ));
            }
            if !out.limitations.is_empty() {
                parts.push(format!("**Limitations:**\n{}", bullet_list(&out.limitations)));
            }
        }
    }

    parts.join("\n\n")
}

fn handler_title(id: HandlerId) -> &'static str {
    match id {
        HandlerId::Research => "Research",
        HandlerId::Data => "Data Analysis",
        HandlerId::Code => "Code",
        HandlerId::Writing => "Writing",
    }
}

/// Full markdown report for a finished run.
pub fn render_report(result: &LoopResult) -> String {
    let record = &result.record;
    let mut md = String::new();

    md.push_str("# Run Report\n\n");
    md.push_str(&format!("**Request**: {}\n", record.original_request()));
    md.push_str(&format!("**Iterations**: {}\n", record.iteration_count()));
    md.push_str(&format!("**Stop reason**: {:?}\n", result.stop_reason));
    if let Some(plan) = record.plan() {
        let steps: Vec<&str> = plan.iter().map(|id| id.as_str()).collect();
        md.push_str(&format!("**Plan**: {}\n", steps.join(" -> ")));
    }
    md.push('\n');

    if record.has_errors() {
        md.push_str("## Errors\n\n");
        md.push_str(&bullet_list(record.errors()));
        md.push_str("\n\n");
    }

    for id in HandlerId::ALL {
        if let Some(output) = record.output(id) {
            md.push_str(&format!("## {} Output\n\n", handler_title(id)));
            md.push_str(&format_handler_output(output));
            md.push_str("\n\n");
        }
    }

    md.push_str("## Decision Log\n\n");
    md.push_str("| Actor | Action | Time |\n");
    md.push_str("|-------|--------|------|\n");
    for event in record.events() {
        md.push_str(&format!(
            "| {} | {} | {} |\n",
            event.actor,
            event.summary.replace('|', "\\|").replace('\n', " "),
            event.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    md
}
