use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upload, index merge, and CDN purge events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PublishEvent {
    /// Upload of one file started
    UploadStarted {
        file: PathBuf,
        destination: String,
    },

    /// Upload of one file finished
    UploadCompleted {
        file: PathBuf,
        destination: String,
        size: u64,
        duration: Duration,
    },

    /// Upload skipped because no host is configured
    UploadSkipped { file: PathBuf, reason: String },

    /// New entries merged into the release index
    IndexMerged {
        package: String,
        added: usize,
        total_versions: usize,
    },

    /// An entry with the same id but different content already exists
    DuplicateEntry { id: String },

    /// Per-release manifest written alongside the index
    ManifestWritten { path: PathBuf, entries: usize },

    /// CDN purge started
    PurgeStarted { urls: usize },

    /// One purge request finished
    PurgeResult { url: String, status: u16, ok: bool },

    /// CDN purge finished
    PurgeCompleted {
        purged: usize,
        failed: usize,
        duration: Duration,
    },
}
