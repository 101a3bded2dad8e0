//! The merge-and-upload flow behind `shipwright publish`

use crate::purge::CdnPurger;
use crate::upload::Uploader;
use serde::Serialize;
use shipwright_config::Config;
use shipwright_errors::{Error, PublishError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, PublishEvent};
use shipwright_hash::Hash;
use shipwright_manifest::{
    load_entry, manifest_path, ReleaseEntry, ReleaseIndex, ReleaseManifest,
};
use shipwright_types::ReleaseTag;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Suffix of the install descriptors pack stages write
pub const DESCRIPTOR_SUFFIX: &str = ".install.json";

/// One file set to publish: its index entry plus the local package file
#[derive(Debug, Clone)]
pub struct Upload {
    pub entry: ReleaseEntry,
    pub source: PathBuf,
}

/// What one publish did
#[derive(Debug, Clone, Serialize)]
pub struct PublishSummary {
    /// Entries newly added to the index
    pub merged: usize,
    /// Identical entries already present
    pub unchanged: usize,
    /// Entries that replaced a divergent duplicate
    pub divergent: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub purged: usize,
}

/// Find install descriptors under `dir`, one directory level deep
///
/// Each descriptor's package file is expected next to it, named after
/// the last segment of the entry's URL.
///
/// # Errors
///
/// Returns `NothingToPublish` when no descriptor is found, and an error
/// for a descriptor that cannot be read or fails validation.
pub async fn collect_uploads(dir: &Path) -> Result<Vec<Upload>, Error> {
    let mut descriptors = Vec::new();
    let mut top = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?;
    while let Some(item) = top
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?
    {
        let path = item.path();
        if is_descriptor(&path) {
            descriptors.push(path);
        } else if item
            .file_type()
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?
            .is_dir()
        {
            let mut sub = fs::read_dir(&path)
                .await
                .map_err(|e| Error::io_with_path(&e, &path))?;
            while let Some(nested) = sub
                .next_entry()
                .await
                .map_err(|e| Error::io_with_path(&e, &path))?
            {
                if is_descriptor(&nested.path()) {
                    descriptors.push(nested.path());
                }
            }
        }
    }
    descriptors.sort();

    if descriptors.is_empty() {
        return Err(PublishError::NothingToPublish {
            message: format!("no install descriptors under {}", dir.display()),
        }
        .into());
    }

    let mut uploads = Vec::with_capacity(descriptors.len());
    for path in descriptors {
        let entry = load_entry(&path).await?;
        entry.validate()?;
        let file_name = entry.url.rsplit('/').next().unwrap_or_default();
        if file_name.is_empty() {
            return Err(PublishError::NothingToPublish {
                message: format!("descriptor {} has a directory URL", path.display()),
            }
            .into());
        }
        let source = path.parent().unwrap_or(dir).join(file_name);
        uploads.push(Upload { entry, source });
    }
    Ok(uploads)
}

/// Hash every package file and record hash and size on its entry
///
/// # Errors
///
/// Returns an error if a package file cannot be read.
pub async fn hash_uploads(uploads: &mut [Upload]) -> Result<(), Error> {
    for upload in uploads {
        let digest = Hash::hash_file(&upload.source).await?;
        let size = fs::metadata(&upload.source)
            .await
            .map_err(|e| Error::io_with_path(&e, &upload.source))?
            .len();
        upload.entry.set_hash(digest.to_hex(), size);
    }
    Ok(())
}

/// Run the whole merge-and-upload flow for one release
///
/// Hashes the packages, merges the release index, writes the
/// per-release manifest, uploads files then index then manifest, and
/// finally purges the published URLs. The index uploads after the
/// files so a reader never sees an entry whose package is missing.
/// Without an upload host the index work still happens and every
/// upload and purge is skipped.
///
/// # Errors
///
/// Returns the first error of any step; every step is fatal.
pub async fn publish_release(
    config: &Config,
    tag: &ReleaseTag,
    package_dir: &Path,
    tx: &EventSender,
) -> Result<PublishSummary, Error> {
    let mut uploads = collect_uploads(package_dir).await?;
    hash_uploads(&mut uploads).await?;

    let index_path = config.index_path();
    let mut index = ReleaseIndex::load(&index_path).await?;
    let entries: Vec<ReleaseEntry> = uploads.iter().map(|u| u.entry.clone()).collect();
    let report = index.merge(entries.clone())?;
    for id in &report.divergent {
        tx.emit(AppEvent::Publish(PublishEvent::DuplicateEntry {
            id: id.clone(),
        }));
    }
    for (package, added) in &report.added {
        tx.emit(AppEvent::Publish(PublishEvent::IndexMerged {
            package: package.clone(),
            added: *added,
            total_versions: index.versions(package).len(),
        }));
    }
    index.save(&index_path).await?;

    let manifest_file = manifest_path(&index_path, tag);
    let manifest = ReleaseManifest::new(entries);
    manifest.save(&manifest_file).await?;
    tx.emit(AppEvent::Publish(PublishEvent::ManifestWritten {
        path: manifest_file.clone(),
        entries: manifest.versions.len(),
    }));

    let uploader = Uploader::new(config.publish.clone(), tx.clone());
    let mut uploaded = 0usize;
    let mut skipped = 0usize;
    for upload in &uploads {
        let dest = uploader.url_to_path(&upload.entry.url)?;
        uploader.upload_file(&upload.source, &dest).await?;
        if uploader.enabled() {
            uploaded += 1;
        } else {
            skipped += 1;
        }
    }

    let mut purged = 0usize;
    if uploader.enabled() {
        if let Some(index_url) = &config.publish.index_url {
            let dest = uploader.url_to_path(index_url)?;
            uploader.upload_file(&index_path, &dest).await?;
            uploaded += 1;
        }
        if let Some(manifest_url) = manifest_url(&uploads, &manifest_file) {
            let dest = uploader.url_to_path(&manifest_url)?;
            uploader.upload_file(&manifest_file, &dest).await?;
            uploaded += 1;
        }

        let mut urls: Vec<String> = uploads.iter().map(|u| u.entry.url.clone()).collect();
        if let Some(index_url) = &config.publish.index_url {
            urls.push(index_url.clone());
        }
        let purger = CdnPurger::new(&config.network, tx.clone())?;
        purger.purge_all(&urls).await?;
        purged = urls.len();
    }

    Ok(PublishSummary {
        merged: report.added_total(),
        unchanged: report.unchanged,
        divergent: report.divergent.len(),
        uploaded,
        skipped,
        purged,
    })
}

/// The per-release manifest publishes into the release's own directory
fn manifest_url(uploads: &[Upload], manifest_file: &Path) -> Option<String> {
    let first = uploads.first()?;
    let (dir, _) = first.entry.url.rsplit_once('/')?;
    let name = manifest_file.file_name().and_then(OsStr::to_str)?;
    Some(format!("{dir}/{name}"))
}

fn is_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.ends_with(DESCRIPTOR_SUFFIX))
}
