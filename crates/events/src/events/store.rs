use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact store events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// A named artifact was published into the run's store
    ArtifactPublished {
        name: String,
        producer: String,
        files: usize,
        total_size: u64,
    },

    /// A consumer materialized an artifact into its work directory
    ArtifactFetched { name: String, consumer: String },

    /// An artifact was exported as a tar archive
    ArtifactExported { name: String, archive: PathBuf },

    /// An archive was imported into the store under a name
    ArtifactImported { name: String, archive: PathBuf },

    /// Store verification pass finished
    VerificationCompleted {
        artifacts: usize,
        corrupted: Vec<String>,
    },
}
