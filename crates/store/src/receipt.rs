//! Artifact receipts and stored-artifact access

use chrono::{DateTime, Utc};
use shipwright_errors::{Error, StoreError};
use shipwright_hash::{Hash, HashedFile};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File name of the receipt inside each stored artifact directory
pub const RECEIPT_FILE: &str = "receipt.json";

/// Per-artifact receipt written at publication time
///
/// Records who published the artifact and the hash of every file it
/// contains. Verification re-hashes the stored files against these
/// records.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    /// Expanded artifact name
    pub artifact: String,
    /// Stage instance that published the artifact
    pub producer: String,
    /// Publication time
    pub created_at: DateTime<Utc>,
    /// Per-file hash records, sorted by relative path
    pub files: Vec<HashedFile>,
}

impl Receipt {
    /// Total size of all recorded files in bytes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Number of recorded files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Load a receipt from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid
    /// receipt JSON.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, path))?;
        serde_json::from_str(&data).map_err(|e| {
            StoreError::CorruptedReceipt {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Write the receipt as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .await
            .map_err(|e| Error::io_with_path(&e, path))
    }
}

/// An artifact directory in the store, loaded with its receipt
pub struct StoredArtifact {
    path: PathBuf,
    receipt: Receipt,
}

impl StoredArtifact {
    /// Load a stored artifact from its directory
    ///
    /// # Errors
    ///
    /// Returns an error if the receipt is missing or unreadable.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let receipt = Receipt::load(&path.join(RECEIPT_FILE)).await?;
        Ok(Self {
            path: path.to_path_buf(),
            receipt,
        })
    }

    /// Get the receipt
    #[must_use]
    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    /// Get the artifact directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the payload directory
    #[must_use]
    pub fn files_path(&self) -> PathBuf {
        self.path.join("files")
    }

    /// Copy the artifact payload into a destination directory
    ///
    /// The store stays authoritative: consumers get copies, never links
    /// into the store, so a stage that rewrites its inputs cannot corrupt
    /// the published artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload directory is missing or any copy
    /// fails.
    pub async fn materialize_to(&self, dest: &Path) -> Result<(), Error> {
        let files_dir = self.files_path();
        if !fs::try_exists(&files_dir).await.unwrap_or(false) {
            return Err(StoreError::CorruptedData {
                message: format!("{}: missing files directory", self.receipt.artifact),
            }
            .into());
        }
        copy_tree(&files_dir, dest).await
    }

    /// Re-hash every recorded file and compare against the receipt
    ///
    /// # Errors
    ///
    /// Returns `SourceMissing` for a recorded file that no longer exists
    /// and `HashMismatch` for one whose contents changed.
    pub async fn verify(&self) -> Result<(), Error> {
        let files_dir = self.files_path();
        for record in &self.receipt.files {
            let path = files_dir.join(&record.relative_path);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return Err(StoreError::SourceMissing {
                    name: self.receipt.artifact.clone(),
                    path: record.relative_path.clone(),
                }
                .into());
            }
            let actual = if record.is_symlink {
                let target = fs::read_link(&path).await?;
                Hash::from_data(target.to_string_lossy().as_bytes())
            } else {
                Hash::hash_file(&path).await?
            };
            if actual != record.hash {
                return Err(StoreError::HashMismatch {
                    name: self.receipt.artifact.clone(),
                    expected: record.hash.to_hex(),
                    actual: actual.to_hex(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Recursively copy a directory tree, preserving symlinks
pub(crate) async fn copy_tree(src: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    let mut entries = fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path).await?;

        if metadata.is_dir() {
            Box::pin(copy_tree(&src_path, &dest_path)).await?;
        } else if metadata.is_symlink() {
            let target = fs::read_link(&src_path).await?;
            if fs::try_exists(&dest_path).await.unwrap_or(false) {
                fs::remove_file(&dest_path).await?;
            }
            #[cfg(unix)]
            {
                fs::symlink(&target, &dest_path).await?;
            }
            #[cfg(not(unix))]
            {
                let _ = target;
            }
        } else {
            fs::copy(&src_path, &dest_path)
                .await
                .map_err(|e| Error::io_with_path(&e, &src_path))?;
        }
    }

    Ok(())
}
