use crate::FailureContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Signing gate events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SigningEvent {
    /// The gate started processing an instance's files
    GateStarted {
        instance: String,
        group: String,
        files: usize,
    },

    /// Credential group is `unsigned`: the authority is never contacted
    SigningSkipped { instance: String, group: String },

    /// One file submitted to the signing authority
    Submitted {
        file: PathBuf,
        attempt: u32,
        max_attempts: u32,
    },

    /// Authority call failed; another attempt is scheduled
    RetryScheduled {
        file: PathBuf,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// Signature returned and verified against the trusted key
    Verified { file: PathBuf },

    /// Detached sidecar written and trailer embedded
    Signed { file: PathBuf, signature_size: usize },

    /// Gate failed for a file
    Failed {
        file: PathBuf,
        failure: FailureContext,
    },
}
