//! Directory-tree hashing for artifact receipts
//!
//! Hashes every file under an artifact directory with bounded concurrency,
//! producing the per-file records that go into the artifact's receipt and
//! that verification re-checks later.

use crate::Hash;
use shipwright_errors::{Error, StoreError};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Result of hashing a single file within an artifact
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HashedFile {
    /// Relative path within the artifact directory
    pub relative_path: String,
    /// BLAKE3 hash of the file contents (symlinks hash their target path)
    pub hash: Hash,
    /// File size in bytes
    pub size: u64,
    /// Whether this is a symlink
    pub is_symlink: bool,
}

/// Configuration for tree hashing operations
#[derive(Debug, Clone)]
pub struct TreeHasherConfig {
    /// Maximum number of concurrent hash operations
    pub max_concurrency: usize,
}

impl Default for TreeHasherConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Tree hasher for processing artifact directories
#[derive(Debug, Clone)]
pub struct TreeHasher {
    config: TreeHasherConfig,
}

impl TreeHasher {
    /// Create a new tree hasher with the given configuration
    #[must_use]
    pub fn new(config: TreeHasherConfig) -> Self {
        Self { config }
    }

    /// Hash a single file and collect metadata
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or metadata cannot be accessed
    pub async fn hash_entry(&self, path: &Path, base_path: &Path) -> Result<HashedFile, Error> {
        let metadata = tokio::fs::symlink_metadata(path).await?;

        let relative_path = path
            .strip_prefix(base_path)
            .map_err(|_| StoreError::IoError {
                message: format!("failed to compute relative path for {}", path.display()),
            })?
            .to_string_lossy()
            .to_string();

        if metadata.is_symlink() {
            // For symlinks, hash the target path
            let target = tokio::fs::read_link(path).await?;
            let target_string = target.to_string_lossy().to_string();
            let target_bytes = target_string.as_bytes();

            Ok(HashedFile {
                relative_path,
                hash: Hash::from_data(target_bytes),
                size: target_bytes.len() as u64,
                is_symlink: true,
            })
        } else {
            let hash = Hash::hash_file(path).await?;

            Ok(HashedFile {
                relative_path,
                hash,
                size: metadata.len(),
                is_symlink: false,
            })
        }
    }

    /// Hash all files in a directory recursively
    ///
    /// Results are sorted by relative path, so receipts written from them
    /// are deterministic for identical trees.
    ///
    /// # Errors
    /// Returns an error if directory traversal fails or file operations fail
    pub async fn hash_tree(&self, dir_path: &Path) -> Result<Vec<HashedFile>, Error> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let base_path = dir_path.to_path_buf();

        // Spawn task to collect files
        let collector_handle = tokio::spawn({
            let base_path = base_path.clone();
            let tx = tx.clone();
            async move { collect_files(&base_path, tx).await }
        });

        // Drop the original sender so the channel closes when collection is done
        drop(tx);

        let mut results = Vec::new();
        let mut tasks = JoinSet::new();
        let semaphore =
            std::sync::Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrency));

        while let Some(file_path) = rx.recv().await {
            let permit =
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| StoreError::IoError {
                        message: format!("semaphore acquire error: {e}"),
                    })?;
            let base_path = base_path.clone();
            let hasher = self.clone();

            tasks.spawn(async move {
                let _permit = permit; // Hold permit until task completes
                hasher.hash_entry(&file_path, &base_path).await
            });
        }

        // Wait for collector to finish
        collector_handle.await.map_err(|e| StoreError::IoError {
            message: format!("task join error: {e}"),
        })??;

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(hashed)) => results.push(hashed),
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(StoreError::IoError {
                        message: format!("task join error: {e}"),
                    }
                    .into())
                }
            }
        }

        results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Ok(results)
    }
}

/// Helper function to collect files for hashing
async fn collect_files(current_path: &Path, tx: mpsc::UnboundedSender<PathBuf>) -> Result<(), Error> {
    let mut entries = tokio::fs::read_dir(current_path).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = entry.metadata().await?;

        if metadata.is_dir() {
            Box::pin(collect_files(&path, tx.clone())).await?;
        } else {
            // Send file or symlink for hashing
            let _ = tx.send(path);
        }
    }

    Ok(())
}
