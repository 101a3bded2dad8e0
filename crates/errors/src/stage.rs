//! Stage execution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StageError {
    #[error("stage {stage} failed: {message}")]
    Failed { stage: String, message: String },

    #[error("stage {stage} exited with status {code}")]
    CommandFailed { stage: String, code: i32 },

    #[error("stage {stage} terminated by signal")]
    CommandKilled { stage: String },

    #[error("tool not found: {tool} (required by stage {stage})")]
    ToolNotFound { stage: String, tool: String },

    #[error("stage {stage} timed out after {seconds} seconds")]
    Timeout { stage: String, seconds: u64 },

    #[error("stage {stage} declared output {artifact} but produced no file at {path}")]
    MissingOutput {
        stage: String,
        artifact: String,
        path: String,
    },

    #[error("input {artifact} for stage {stage} is not in the artifact store")]
    MissingInput { stage: String, artifact: String },

    #[error("stage {stage} skipped: upstream {failed} failed")]
    Skipped { stage: String, failed: String },

    #[error("unexpanded placeholder {placeholder} in stage {stage}")]
    UnexpandedPlaceholder { stage: String, placeholder: String },

    #[error("workspace error for stage {stage}: {message}")]
    Workspace { stage: String, message: String },

    #[error("spawn failed for stage {stage}: {message}")]
    SpawnFailed { stage: String, message: String },
}

impl UserFacingError for StageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ToolNotFound { .. } => {
                Some("Install the tool or adjust the stage command, then resume the run.")
            }
            Self::CommandFailed { .. } | Self::Failed { .. } => {
                Some("Inspect the captured stage output, fix the cause, and resume the run.")
            }
            Self::Timeout { .. } => Some("Raise the stage timeout in the pipeline and resume."),
            Self::MissingOutput { .. } => {
                Some("The stage command must write every declared output into its out/ directory.")
            }
            Self::UnexpandedPlaceholder { .. } => {
                Some("Define the variable in settings, run variables, or a matrix axis.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::SpawnFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Failed { .. } => "stage.failed",
            Self::CommandFailed { .. } => "stage.command_failed",
            Self::CommandKilled { .. } => "stage.command_killed",
            Self::ToolNotFound { .. } => "stage.tool_not_found",
            Self::Timeout { .. } => "stage.timeout",
            Self::MissingOutput { .. } => "stage.missing_output",
            Self::MissingInput { .. } => "stage.missing_input",
            Self::Skipped { .. } => "stage.skipped",
            Self::UnexpandedPlaceholder { .. } => "stage.unexpanded_placeholder",
            Self::Workspace { .. } => "stage.workspace",
            Self::SpawnFailed { .. } => "stage.spawn_failed",
        };
        Some(code)
    }
}
