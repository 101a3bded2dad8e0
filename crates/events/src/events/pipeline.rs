use crate::FailureContext;
use serde::{Deserialize, Serialize};
use shipwright_types::{ReleaseTag, RunId};
use std::time::Duration;

/// Pipeline planning and run lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Pipeline expansion and validation started
    PlanStarted { pipeline: String, tag: ReleaseTag },

    /// Plan built: instances after matrix fan-out, grouped into levels
    PlanCompleted {
        pipeline: String,
        instances: usize,
        gated_off: usize,
        levels: usize,
    },

    /// Plan rejected by validation
    PlanInvalid {
        pipeline: String,
        failure: FailureContext,
    },

    /// Tool preflight resolved every required program
    ToolsResolved { tools: Vec<String> },

    /// A required tool is missing from PATH
    ToolMissing { stage: String, tool: String },

    /// Run started
    RunStarted {
        run_id: RunId,
        pipeline: String,
        tag: ReleaseTag,
        instances: usize,
    },

    /// A checkpointed run picked up where it left off
    RunResumed {
        run_id: RunId,
        remaining: usize,
        completed: usize,
    },

    /// One plan level started executing
    LevelStarted { level: usize, instances: usize },

    /// One plan level finished
    LevelCompleted { level: usize, duration: Duration },

    /// Run finished (successfully or not)
    RunCompleted {
        run_id: RunId,
        success: bool,
        completed: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
}
