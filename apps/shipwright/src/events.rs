//! Event handling and terminal feedback

use console::Style;
use shipwright_events::{
    AppEvent, GeneralEvent, PipelineEvent, PublishEvent, SigningEvent, StageEvent, StoreEvent,
};
use tracing::{debug, error, info, trace, warn};

use crate::display::{format_duration, format_size};

/// Event handler for terminal feedback during command execution
pub struct EventHandler {
    /// Whether styled output is enabled
    colors: bool,
    /// Whether debug-level events are shown on the terminal
    debug: bool,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(colors: bool, debug: bool) -> Self {
        Self { colors, debug }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        log_event(&event);
        match event {
            AppEvent::Pipeline(event) => self.handle_pipeline_event(event),
            AppEvent::Stage(event) => self.handle_stage_event(event),
            AppEvent::Store(event) => self.handle_store_event(event),
            AppEvent::Signing(event) => self.handle_signing_event(event),
            AppEvent::Publish(event) => self.handle_publish_event(event),
            AppEvent::General(event) => self.handle_general_event(event),
        }
    }

    fn handle_pipeline_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::PlanStarted { pipeline, tag } => {
                self.show_status(&format!("Planning {pipeline} for {tag}"));
            }
            PipelineEvent::PlanCompleted {
                pipeline: _,
                instances,
                gated_off,
                levels,
            } => {
                if gated_off == 0 {
                    self.show_status(&format!(
                        "Plan ready: {instances} instances in {levels} levels"
                    ));
                } else {
                    self.show_status(&format!(
                        "Plan ready: {instances} instances in {levels} levels ({gated_off} gated off)"
                    ));
                }
            }
            PipelineEvent::PlanInvalid { pipeline, failure } => {
                self.show_error(&format!("Plan for {pipeline} rejected: {}", failure.message));
                if let Some(hint) = failure.hint {
                    self.show_status(&format!("  Hint: {hint}"));
                }
            }
            PipelineEvent::ToolsResolved { tools } => {
                self.show_debug(&format!("Tools resolved: {}", tools.join(", ")));
            }
            PipelineEvent::ToolMissing { stage, tool } => {
                self.show_error(&format!(
                    "{stage}: required tool '{tool}' not found on PATH"
                ));
            }
            PipelineEvent::RunStarted {
                run_id,
                pipeline,
                tag,
                instances,
            } => {
                self.show_status(&format!(
                    "Run {run_id}: {pipeline} {tag}, {instances} instances"
                ));
            }
            PipelineEvent::RunResumed {
                run_id,
                remaining,
                completed,
            } => {
                self.show_status(&format!(
                    "Resuming run {run_id}: {completed} done, {remaining} remaining"
                ));
            }
            PipelineEvent::LevelStarted { level, instances } => {
                self.show_status(&format!("Level {level}: {instances} instance(s)"));
            }
            PipelineEvent::LevelCompleted { level, duration } => {
                self.show_debug(&format!(
                    "Level {level} finished in {}",
                    format_duration(duration)
                ));
            }
            PipelineEvent::RunCompleted { .. } => {
                // Summary rendering happens after the command returns
            }
        }
    }

    fn handle_stage_event(&self, event: StageEvent) {
        match event {
            StageEvent::Started {
                instance,
                stage: _,
                variant: _,
                work_dir,
            } => {
                if self.debug {
                    self.show_status(&format!("{instance}: started in {}", work_dir.display()));
                } else {
                    self.show_status(&format!("{instance}: started"));
                }
            }
            StageEvent::InputsMaterialized {
                instance,
                artifacts,
            } => {
                self.show_debug(&format!(
                    "{instance}: materialized {artifacts} input artifact(s)"
                ));
            }
            StageEvent::CommandStarted {
                instance,
                command_id: _,
                program,
                args,
            } => {
                self.show_status(&format!("{instance}: $ {program} {}", args.join(" ")));
            }
            StageEvent::CommandOutput {
                instance,
                command_id: _,
                line,
                is_stderr,
            } => {
                if is_stderr && self.colors {
                    eprintln!("{instance}: {}", Style::new().dim().apply_to(line));
                } else {
                    eprintln!("{instance}: {line}");
                }
            }
            StageEvent::CommandCompleted {
                instance,
                command_id,
                exit_code,
                duration,
            } => {
                self.show_debug(&format!(
                    "{instance}: {command_id} exited {exit_code} after {}",
                    format_duration(duration)
                ));
            }
            StageEvent::Completed {
                instance,
                artifacts,
                duration,
            } => {
                if artifacts.is_empty() {
                    self.show_status(&format!(
                        "{instance}: completed in {}",
                        format_duration(duration)
                    ));
                } else {
                    self.show_status(&format!(
                        "{instance}: completed in {} (produced {})",
                        format_duration(duration),
                        artifacts.join(", ")
                    ));
                }
            }
            StageEvent::Failed { instance, failure } => {
                self.show_error(&format!("{instance}: {}", failure.message));
                if let Some(hint) = failure.hint {
                    self.show_status(&format!("  Hint: {hint}"));
                }
            }
            StageEvent::Skipped { instance, reason } => {
                self.show_status(&format!("{instance}: skipped ({reason})"));
            }
        }
    }

    fn handle_store_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::ArtifactPublished {
                name,
                producer,
                files,
                total_size,
            } => {
                self.show_debug(&format!(
                    "{producer}: published {name} ({files} files, {})",
                    format_size(total_size)
                ));
            }
            StoreEvent::ArtifactFetched { name, consumer } => {
                self.show_debug(&format!("{consumer}: fetched {name}"));
            }
            StoreEvent::ArtifactExported { name, archive } => {
                self.show_status(&format!("Exported {name} to {}", archive.display()));
            }
            StoreEvent::ArtifactImported { name, archive } => {
                self.show_status(&format!("Imported {name} from {}", archive.display()));
            }
            StoreEvent::VerificationCompleted {
                artifacts,
                corrupted,
            } => {
                if corrupted.is_empty() {
                    self.show_status(&format!("Verified {artifacts} artifact(s)"));
                } else {
                    self.show_warning(&format!(
                        "{} of {artifacts} artifact(s) corrupted: {}",
                        corrupted.len(),
                        corrupted.join(", ")
                    ));
                }
            }
        }
    }

    fn handle_signing_event(&self, event: SigningEvent) {
        match event {
            SigningEvent::GateStarted {
                instance,
                group,
                files,
            } => {
                self.show_status(&format!(
                    "{instance}: signing {files} file(s) with group '{group}'"
                ));
            }
            SigningEvent::SigningSkipped { instance, group: _ } => {
                self.show_status(&format!("{instance}: unsigned group, signing skipped"));
            }
            SigningEvent::Submitted {
                file,
                attempt,
                max_attempts,
            } => {
                self.show_debug(&format!(
                    "Submitted {} (attempt {attempt}/{max_attempts})",
                    file.display()
                ));
            }
            SigningEvent::RetryScheduled {
                file,
                attempt,
                delay_ms,
                error,
            } => {
                self.show_warning(&format!(
                    "Signing attempt {attempt} for {} failed ({error}), retrying in {delay_ms}ms",
                    file.display()
                ));
            }
            SigningEvent::Verified { file } => {
                self.show_debug(&format!("Signature verified for {}", file.display()));
            }
            SigningEvent::Signed {
                file,
                signature_size,
            } => {
                self.show_status(&format!(
                    "Signed {} ({signature_size} byte signature)",
                    file.display()
                ));
            }
            SigningEvent::Failed { file, failure } => {
                self.show_error(&format!(
                    "Signing {} failed: {}",
                    file.display(),
                    failure.message
                ));
                if let Some(hint) = failure.hint {
                    self.show_status(&format!("  Hint: {hint}"));
                }
            }
        }
    }

    fn handle_publish_event(&self, event: PublishEvent) {
        match event {
            PublishEvent::UploadStarted { file, destination } => {
                self.show_status(&format!("Uploading {} to {destination}", file.display()));
            }
            PublishEvent::UploadCompleted {
                file,
                destination: _,
                size,
                duration,
            } => {
                self.show_status(&format!(
                    "Uploaded {} ({}, {})",
                    file.display(),
                    format_size(size),
                    format_duration(duration)
                ));
            }
            PublishEvent::UploadSkipped { file, reason } => {
                self.show_status(&format!(
                    "Skipped upload of {} ({reason})",
                    file.display()
                ));
            }
            PublishEvent::IndexMerged {
                package,
                added,
                total_versions,
            } => {
                self.show_status(&format!(
                    "Index for {package}: {added} added, {total_versions} versions total"
                ));
            }
            PublishEvent::DuplicateEntry { id } => {
                self.show_warning(&format!("Index already lists {id} with different content"));
            }
            PublishEvent::ManifestWritten { path, entries } => {
                self.show_status(&format!(
                    "Wrote manifest {} ({entries} entries)",
                    path.display()
                ));
            }
            PublishEvent::PurgeStarted { urls } => {
                self.show_status(&format!("Purging {urls} CDN URL(s)"));
            }
            PublishEvent::PurgeResult { url, status, ok } => {
                if ok {
                    self.show_debug(&format!("Purged {url} ({status})"));
                } else {
                    self.show_warning(&format!("Purge of {url} returned {status}"));
                }
            }
            PublishEvent::PurgeCompleted {
                purged,
                failed,
                duration,
            } => {
                if failed == 0 {
                    self.show_status(&format!(
                        "Purged {purged} URL(s) in {}",
                        format_duration(duration)
                    ));
                } else {
                    self.show_warning(&format!(
                        "Purge finished with {failed} failure(s) ({purged} ok) in {}",
                        format_duration(duration)
                    ));
                }
            }
        }
    }

    fn handle_general_event(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                if let Some(context) = context {
                    self.show_warning(&format!("{message}: {context}"));
                } else {
                    self.show_warning(&message);
                }
            }
            GeneralEvent::Error { message, details } => {
                if let Some(details) = details {
                    self.show_error(&format!("{message}: {details}"));
                } else {
                    self.show_error(&message);
                }
            }
            GeneralEvent::DebugLog { message, .. } => {
                self.show_debug(&message);
            }
            GeneralEvent::OperationStarted { operation } => {
                self.show_status(&operation);
            }
            GeneralEvent::OperationCompleted { operation, success } => {
                if success {
                    self.show_debug(&format!("{operation} completed"));
                } else {
                    self.show_warning(&format!("{operation} completed with problems"));
                }
            }
            GeneralEvent::OperationFailed { operation, error } => {
                self.show_error(&format!("{operation} failed: {error}"));
            }
            GeneralEvent::ConfigurationError {
                field,
                error,
                suggested_fix,
            } => {
                self.show_error(&format!("Configuration error in {field}: {error}"));
                if let Some(fix) = suggested_fix {
                    self.show_status(&format!("  Fix: {fix}"));
                }
            }
        }
    }

    /// Show status message
    fn show_status(&self, message: &str) {
        // Progress lines go to stderr so stdout stays clean for results
        eprintln!("{message}");
    }

    /// Show warning message
    fn show_warning(&self, message: &str) {
        if self.colors {
            eprintln!(
                "{} {message}",
                Style::new().yellow().bold().apply_to("[WARN]")
            );
        } else {
            eprintln!("[WARN] {message}");
        }
    }

    /// Show error message
    fn show_error(&self, message: &str) {
        if self.colors {
            eprintln!("{} {message}", Style::new().red().bold().apply_to("[ERROR]"));
        } else {
            eprintln!("[ERROR] {message}");
        }
    }

    /// Show message only when debug output is enabled
    fn show_debug(&self, message: &str) {
        if self.debug {
            if self.colors {
                eprintln!("{}", Style::new().dim().apply_to(message));
            } else {
                eprintln!("{message}");
            }
        }
    }
}

/// Forward an event into the tracing pipeline at its mapped level
fn log_event(event: &AppEvent) {
    let source = event.event_source();
    let fields = event.log_fields();
    match event.log_level() {
        tracing::Level::ERROR => error!(source = source.as_str(), "{fields}"),
        tracing::Level::WARN => warn!(source = source.as_str(), "{fields}"),
        tracing::Level::INFO => info!(source = source.as_str(), "{fields}"),
        tracing::Level::DEBUG => debug!(source = source.as_str(), "{fields}"),
        _ => trace!(source = source.as_str(), "{fields}"),
    }
}
