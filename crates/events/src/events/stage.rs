use crate::FailureContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Stage instance execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageEvent {
    /// Instance started in its fresh work directory
    Started {
        instance: String,
        stage: String,
        variant: String,
        work_dir: PathBuf,
    },

    /// Consumed artifacts materialized into the work directory
    InputsMaterialized { instance: String, artifacts: usize },

    /// One external command started
    CommandStarted {
        instance: String,
        command_id: String,
        program: String,
        args: Vec<String>,
    },

    /// Real-time command output
    CommandOutput {
        instance: String,
        command_id: String,
        line: String,
        is_stderr: bool,
    },

    /// One external command finished
    CommandCompleted {
        instance: String,
        command_id: String,
        exit_code: i32,
        duration: Duration,
    },

    /// Instance completed; its outputs are published
    Completed {
        instance: String,
        artifacts: Vec<String>,
        duration: Duration,
    },

    /// Instance failed; the run will stop after siblings settle
    Failed {
        instance: String,
        failure: FailureContext,
    },

    /// Instance skipped (condition gating or upstream failure)
    Skipped { instance: String, reason: String },
}
