//! Output rendering and formatting

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use serde::Serialize;
use shipwright_graph::{ArtifactBinding, ExecutionPlan, InstanceKind};
use shipwright_publish::PublishSummary;
use shipwright_runner::{RunState, RunSummary, StatusCounts};
use shipwright_types::{ColorChoice, InstanceStatus, ReleaseTag, RunId};
use std::io;
use std::time::Duration;

/// Final result of one command invocation
pub enum CommandOutcome {
    Plan(ExecutionPlan),
    Run(RunSummary),
    Ledger(RunState),
    Runs(Vec<RunEntry>),
    Publish(PublishSummary),
    Purge(PurgeReport),
}

impl CommandOutcome {
    /// Serialize the inner result for `--json` output
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            CommandOutcome::Plan(plan) => serde_json::to_string_pretty(plan),
            CommandOutcome::Run(summary) => serde_json::to_string_pretty(summary),
            CommandOutcome::Ledger(state) => serde_json::to_string_pretty(state),
            CommandOutcome::Runs(entries) => serde_json::to_string_pretty(entries),
            CommandOutcome::Publish(summary) => serde_json::to_string_pretty(summary),
            CommandOutcome::Purge(report) => serde_json::to_string_pretty(report),
        }
    }
}

/// One row of the run listing
#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub run_id: RunId,
    pub pipeline: String,
    pub tag: ReleaseTag,
    pub created_at: DateTime<Utc>,
    pub finished: bool,
    pub counts: StatusCounts,
}

impl From<&RunState> for RunEntry {
    fn from(state: &RunState) -> Self {
        Self {
            run_id: state.run_id,
            pipeline: state.pipeline.clone(),
            tag: state.tag.clone(),
            created_at: state.created_at,
            finished: state.finished,
            counts: state.counts(),
        }
    }
}

/// Result of a stand-alone purge
#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    /// Base URL the purge paths were expanded under
    pub base: String,
    pub purged: usize,
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render command outcome
    pub fn render(&self, outcome: &CommandOutcome) -> io::Result<()> {
        if self.json_output {
            let json = outcome.to_json().map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }
        match outcome {
            CommandOutcome::Plan(plan) => self.render_plan(plan),
            CommandOutcome::Run(summary) => self.render_run_summary(summary),
            CommandOutcome::Ledger(state) => self.render_ledger(state),
            CommandOutcome::Runs(entries) => self.render_runs(entries),
            CommandOutcome::Publish(summary) => self.render_publish_summary(summary),
            CommandOutcome::Purge(report) => self.render_purge_report(report),
        }
    }

    /// Render execution plan
    fn render_plan(&self, plan: &ExecutionPlan) -> io::Result<()> {
        println!(
            "{}",
            self.style_title(&format!("Plan: {} for {}", plan.pipeline, plan.tag))
        );
        println!();

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Level").add_attribute(Attribute::Bold),
            Cell::new("Instance").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Consumes").add_attribute(Attribute::Bold),
            Cell::new("Produces").add_attribute(Attribute::Bold),
        ]);

        for (level, names) in plan.levels.iter().enumerate() {
            for name in names {
                let Some(instance) = plan.instance(name) else {
                    continue;
                };
                let kind_cell = match instance.kind {
                    InstanceKind::Run => Cell::new("run"),
                    InstanceKind::Sign => Cell::new("sign").fg(Color::Magenta),
                };
                table.add_row(vec![
                    Cell::new(level.to_string()),
                    Cell::new(name),
                    kind_cell,
                    Cell::new(join_bindings(&instance.consumes)),
                    Cell::new(join_bindings(&instance.produces)),
                ]);
            }
        }

        println!("{table}");

        if !plan.gated_off.is_empty() {
            println!();
            println!(
                "Gated off for {}: {}",
                plan.tag,
                plan.gated_off.join(", ")
            );
        }

        Ok(())
    }

    /// Render run summary
    fn render_run_summary(&self, summary: &RunSummary) -> io::Result<()> {
        let counts = &summary.counts;
        let duration = format_duration(summary.duration);

        if summary.success {
            println!(
                "[OK] Run {} completed: {} instances in {duration}",
                summary.run_id, counts.completed
            );
            if counts.skipped > 0 {
                println!("  Skipped: {} (gated off for this tag)", counts.skipped);
            }
        } else {
            println!(
                "[ERROR] Run {} failed after {duration}: {} failed, {} skipped, {} completed",
                summary.run_id, counts.failed, counts.skipped, counts.completed
            );
        }

        Ok(())
    }

    /// Render run ledger
    fn render_ledger(&self, state: &RunState) -> io::Result<()> {
        println!("{}", self.style_title(&format!("Run {}", state.run_id)));
        println!();
        println!("Pipeline: {}", state.pipeline);
        println!("Tag:      {}", state.tag);
        println!("Signing:  {}", state.signing_group);
        println!(
            "Created:  {}",
            state.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("Finished: {}", if state.finished { "Yes" } else { "No" });
        println!();

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Instance").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Duration").add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
        ]);

        for (name, record) in &state.instances {
            let duration = match (record.started_at, record.finished_at) {
                (Some(started), Some(finished)) => (finished - started)
                    .to_std()
                    .map_or_else(|_| "-".to_string(), format_duration),
                _ => "-".to_string(),
            };
            table.add_row(vec![
                Cell::new(name),
                format_instance_status(record.status),
                Cell::new(duration),
                Cell::new(record.reason.as_deref().unwrap_or("-")),
            ]);
        }

        println!("{table}");
        Ok(())
    }

    /// Render run listing
    fn render_runs(&self, entries: &[RunEntry]) -> io::Result<()> {
        if entries.is_empty() {
            println!("No runs found.");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Run").add_attribute(Attribute::Bold),
            Cell::new("Pipeline").add_attribute(Attribute::Bold),
            Cell::new("Tag").add_attribute(Attribute::Bold),
            Cell::new("Created").add_attribute(Attribute::Bold),
            Cell::new("Progress").add_attribute(Attribute::Bold),
            Cell::new("State").add_attribute(Attribute::Bold),
        ]);

        for entry in entries {
            let state_cell = if entry.finished {
                Cell::new("finished").fg(Color::Green)
            } else if entry.counts.failed > 0 {
                Cell::new("failed").fg(Color::Red)
            } else {
                Cell::new("in progress").fg(Color::Yellow)
            };
            table.add_row(vec![
                Cell::new(entry.run_id.to_string()),
                Cell::new(&entry.pipeline),
                Cell::new(entry.tag.to_string()),
                Cell::new(entry.created_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(format!(
                    "{}/{}",
                    entry.counts.completed,
                    entry.counts.total()
                )),
                state_cell,
            ]);
        }

        println!("{table}");
        Ok(())
    }

    /// Render publish summary
    fn render_publish_summary(&self, summary: &PublishSummary) -> io::Result<()> {
        println!("{}", self.style_title("Publish Summary"));
        println!();
        println!("Merged:    {}", summary.merged);
        println!("Unchanged: {}", summary.unchanged);
        println!("Divergent: {}", summary.divergent);
        println!("Uploaded:  {}", summary.uploaded);
        println!("Skipped:   {}", summary.skipped);
        println!("Purged:    {}", summary.purged);
        Ok(())
    }

    /// Render purge report
    fn render_purge_report(&self, report: &PurgeReport) -> io::Result<()> {
        println!(
            "[OK] Purged {} URLs under {}",
            report.purged, report.base
        );
        Ok(())
    }

    /// Style a title line
    fn style_title(&self, title: &str) -> String {
        if self.supports_color() {
            Style::new().bold().apply_to(title).to_string()
        } else {
            title.to_string()
        }
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

/// Format instance status as colored cell
fn format_instance_status(status: InstanceStatus) -> Cell {
    match status {
        InstanceStatus::Pending => Cell::new("pending"),
        InstanceStatus::Running => Cell::new("running").fg(Color::Blue),
        InstanceStatus::Completed => Cell::new("completed").fg(Color::Green),
        InstanceStatus::Failed => Cell::new("failed").fg(Color::Red),
        InstanceStatus::Skipped => Cell::new("skipped").fg(Color::Yellow),
    }
}

fn join_bindings(bindings: &[ArtifactBinding]) -> String {
    if bindings.is_empty() {
        return "-".to_string();
    }
    let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
    names.join(", ")
}

/// Format a duration in seconds with one decimal
pub(crate) fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// Format byte size in human readable format
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{size:.0} {}", UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}
