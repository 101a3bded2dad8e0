//! Run lifecycle error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum RunError {
    #[error("run {run_id} not found under {path}")]
    NotFound { run_id: String, path: String },

    #[error("run {run_id} is already finished")]
    AlreadyFinished { run_id: String },

    #[error("run ledger is corrupted: {message}")]
    LedgerCorrupted { message: String },

    #[error("run {run_id} has no pipeline copy at {path}")]
    PipelineCopyMissing { run_id: String, path: String },
}

impl UserFacingError for RunError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => {
                Some("List the directories under the work root to find known run ids.")
            }
            Self::AlreadyFinished { .. } => {
                Some("Finished runs are immutable; start a new run for this tag.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "run.not_found",
            Self::AlreadyFinished { .. } => "run.already_finished",
            Self::LedgerCorrupted { .. } => "run.ledger_corrupted",
            Self::PipelineCopyMissing { .. } => "run.pipeline_copy_missing",
        };
        Some(code)
    }
}
