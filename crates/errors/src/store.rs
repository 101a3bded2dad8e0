//! Artifact store error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StoreError {
    #[error("artifact not found: {name}")]
    ArtifactNotFound { name: String },

    #[error("artifact {name} already published by stage {producer}")]
    DuplicateArtifact { name: String, producer: String },

    #[error("hash mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("source file missing for {name}: {path}")]
    SourceMissing { name: String, path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("store root not found: {path}")]
    RootNotFound { path: std::path::PathBuf },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("corrupted receipt: {message}")]
    CorruptedReceipt { message: String },

    #[error("atomic rename failed: {message}")]
    AtomicRenameFailed { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        // Without a known path, avoid inventing placeholders; preserve message only
        Self::IoError {
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Convert an `io::Error` into a `StoreError` with an associated path
    #[must_use]
    pub fn from_io_with_path(err: &std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::NotFound => Self::IoError {
                message: format!("not found: {}", path.display()),
            },
            _ => Self::IoError {
                message: format!("{}: {}", path.display(), err),
            },
        }
    }
}

impl UserFacingError for StoreError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateArtifact { .. } => {
                Some("Artifact names are unique per run; rename one of the producing stages' outputs.")
            }
            Self::HashMismatch { .. } => {
                Some("The stored file changed after publication; re-run the producing stage.")
            }
            Self::PermissionDenied { .. } => {
                Some("Adjust filesystem permissions on the work directory and retry.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::IoError { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ArtifactNotFound { .. } => "store.artifact_not_found",
            Self::DuplicateArtifact { .. } => "store.duplicate_artifact",
            Self::HashMismatch { .. } => "store.hash_mismatch",
            Self::SourceMissing { .. } => "store.source_missing",
            Self::PermissionDenied { .. } => "store.permission_denied",
            Self::RootNotFound { .. } => "store.root_not_found",
            Self::IoError { .. } => "store.io_error",
            Self::CorruptedData { .. } => "store.corrupted_data",
            Self::CorruptedReceipt { .. } => "store.corrupted_receipt",
            Self::AtomicRenameFailed { .. } => "store.atomic_rename_failed",
        };
        Some(code)
    }
}
