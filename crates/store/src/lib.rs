#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Run-scoped artifact store for shipwright
//!
//! Stages exchange build outputs through this store: a producer publishes
//! a directory under an expanded artifact name, downstream consumers
//! materialize it into their work directories. Every artifact is
//! immutable after publication and carries a receipt with per-file
//! BLAKE3 hashes.

mod archive;
mod receipt;

pub use archive::{export_artifact, import_artifact};
pub use receipt::{Receipt, StoredArtifact, RECEIPT_FILE};

use chrono::Utc;
use dashmap::DashMap;
use shipwright_errors::{Error, StoreError};
use shipwright_hash::{TreeHasher, TreeHasherConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Store of named artifacts for one pipeline run
///
/// The registry is a concurrent map keyed by expanded artifact name; a
/// second publication under the same name is rejected, which is what
/// keeps artifact names unique within a run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_path: PathBuf,
    registry: Arc<DashMap<String, String>>,
}

impl ArtifactStore {
    /// Create a store rooted at `base_path`, creating the directory
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn create(base_path: PathBuf) -> Result<Self, Error> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &base_path))?;
        Ok(Self {
            base_path,
            registry: Arc::new(DashMap::new()),
        })
    }

    /// Open an existing store, loading published artifacts into the registry
    ///
    /// Used on resume: artifacts published by completed instances stay
    /// available without re-running their producers.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or a receipt is unreadable.
    pub async fn open(base_path: PathBuf) -> Result<Self, Error> {
        if !fs::try_exists(&base_path).await.unwrap_or(false) {
            return Err(StoreError::RootNotFound { path: base_path }.into());
        }

        let registry = Arc::new(DashMap::new());
        let mut entries = fs::read_dir(&base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if name.starts_with(".tmp-") {
                // Leftover from an interrupted publication
                let _ = fs::remove_dir_all(entry.path()).await;
                continue;
            }
            let artifact = StoredArtifact::load(&entry.path()).await?;
            registry.insert(name, artifact.receipt().producer.clone());
        }

        Ok(Self {
            base_path,
            registry,
        })
    }

    /// Get the directory for an artifact name
    #[must_use]
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Check whether an artifact has been published
    #[must_use]
    pub fn has_artifact(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// List published artifact names, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Publish a directory as a named artifact
    ///
    /// Hashes every file in `src_dir`, stages a copy with its receipt
    /// under a temporary name, then renames it into place so a crash
    /// never leaves a half-published artifact under its real name.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateArtifact` if the name is already taken, and an
    /// error if hashing or any filesystem operation fails.
    pub async fn publish(
        &self,
        name: &str,
        producer: &str,
        src_dir: &Path,
    ) -> Result<Receipt, Error> {
        if !fs::try_exists(src_dir).await.unwrap_or(false) {
            return Err(StoreError::SourceMissing {
                name: name.to_string(),
                path: src_dir.display().to_string(),
            }
            .into());
        }

        // Claim the name before doing any work
        match self.registry.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                return Err(StoreError::DuplicateArtifact {
                    name: name.to_string(),
                    producer: existing.get().clone(),
                }
                .into());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(producer.to_string());
            }
        }

        let result = self.publish_inner(name, producer, src_dir).await;
        if result.is_err() {
            // Release the claim so a retried instance can publish again
            self.registry.remove(name);
        }
        result
    }

    async fn publish_inner(
        &self,
        name: &str,
        producer: &str,
        src_dir: &Path,
    ) -> Result<Receipt, Error> {
        let staging = self.base_path.join(format!(".tmp-{name}"));
        if fs::try_exists(&staging).await.unwrap_or(false) {
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| Error::io_with_path(&e, &staging))?;

        // Hash the staged copy so the receipt describes the stored bytes
        let files_dir = staging.join("files");
        receipt::copy_tree(src_dir, &files_dir).await?;

        let hasher = TreeHasher::new(TreeHasherConfig::default());
        let files = hasher.hash_tree(&files_dir).await?;

        let receipt = Receipt {
            artifact: name.to_string(),
            producer: producer.to_string(),
            created_at: Utc::now(),
            files,
        };
        receipt.save(&staging.join(RECEIPT_FILE)).await?;

        let dest = self.artifact_path(name);
        fs::rename(&staging, &dest).await.map_err(|e| {
            Error::from(StoreError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", staging.display(), dest.display()),
            })
        })?;

        Ok(receipt)
    }

    /// Withdraw an artifact so its producer can publish it again
    ///
    /// A failed instance can leave some of its outputs published when it
    /// dies between publications. On re-execution the producer retracts
    /// those leftovers first; nobody else may retract them.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotFound` if the name was never published and
    /// `DuplicateArtifact` if it belongs to a different producer.
    pub async fn retract(&self, name: &str, producer: &str) -> Result<(), Error> {
        let owner = match self.registry.get(name) {
            Some(entry) => entry.value().clone(),
            None => {
                return Err(StoreError::ArtifactNotFound {
                    name: name.to_string(),
                }
                .into());
            }
        };
        if owner != producer {
            return Err(StoreError::DuplicateArtifact {
                name: name.to_string(),
                producer: owner,
            }
            .into());
        }

        let path = self.artifact_path(name);
        fs::remove_dir_all(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;
        self.registry.remove(name);
        Ok(())
    }

    /// Materialize a published artifact into a consumer directory
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotFound` if the name was never published.
    pub async fn fetch(&self, name: &str, dest: &Path) -> Result<Receipt, Error> {
        if !self.has_artifact(name) {
            return Err(StoreError::ArtifactNotFound {
                name: name.to_string(),
            }
            .into());
        }
        let artifact = StoredArtifact::load(&self.artifact_path(name)).await?;
        artifact.materialize_to(dest).await?;
        Ok(artifact.receipt().clone())
    }

    /// Load the receipt for a published artifact
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotFound` if the name was never published.
    pub async fn receipt(&self, name: &str) -> Result<Receipt, Error> {
        if !self.has_artifact(name) {
            return Err(StoreError::ArtifactNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Receipt::load(&self.artifact_path(name).join(RECEIPT_FILE)).await
    }

    /// Export a published artifact as a tar archive
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotFound` if the name was never published, or an
    /// error if archive creation fails.
    pub async fn export(&self, name: &str, archive_path: &Path) -> Result<(), Error> {
        if !self.has_artifact(name) {
            return Err(StoreError::ArtifactNotFound {
                name: name.to_string(),
            }
            .into());
        }
        export_artifact(&self.artifact_path(name), archive_path).await
    }

    /// Import an exported artifact archive into this store
    ///
    /// The artifact name comes from the archived receipt and must not be
    /// taken already.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateArtifact` if the archived name is already
    /// published, or an error if extraction fails.
    pub async fn import(&self, archive_path: &Path) -> Result<Receipt, Error> {
        let staging = tempfile::tempdir_in(&self.base_path).map_err(StoreError::from)?;
        import_artifact(archive_path, staging.path()).await?;

        let receipt = Receipt::load(&staging.path().join(RECEIPT_FILE)).await?;

        match self.registry.entry(receipt.artifact.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                return Err(StoreError::DuplicateArtifact {
                    name: receipt.artifact.clone(),
                    producer: existing.get().clone(),
                }
                .into());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(receipt.producer.clone());
            }
        }

        let dest = self.artifact_path(&receipt.artifact);
        let staging_path = staging.keep();
        if let Err(e) = fs::rename(&staging_path, &dest).await {
            self.registry.remove(&receipt.artifact);
            let _ = fs::remove_dir_all(&staging_path).await;
            return Err(StoreError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", staging_path.display(), dest.display()),
            }
            .into());
        }

        Ok(receipt)
    }

    /// Re-hash every published artifact against its receipt
    ///
    /// Returns one `(artifact, problem)` pair per corrupted or incomplete
    /// artifact; an empty list means the store is intact.
    ///
    /// # Errors
    ///
    /// Returns an error only when a receipt itself cannot be read.
    pub async fn verify(&self) -> Result<Vec<(String, String)>, Error> {
        let mut problems = Vec::new();

        for name in self.list() {
            let artifact = StoredArtifact::load(&self.artifact_path(&name)).await?;
            if let Err(e) = artifact.verify().await {
                problems.push((name, e.to_string()));
            }
        }

        Ok(problems)
    }
}
