#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Release index handling for shipwright
//!
//! This crate defines the JSON index that maps package names to their
//! published releases, and the per-release manifest written alongside it.
//! Pack stages emit install descriptors; publishing hashes them, merges
//! them into the index, and writes a manifest of just the new entries.

use serde::{Deserialize, Serialize};
use shipwright_errors::{Error, ManifestError};
use shipwright_types::ReleaseTag;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Hashes of one published file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub blake3: String,
}

/// One published release of a package
///
/// Pack stages write these as `<pkg>.install.json` descriptors without
/// `hash` and `size`; publishing fills both in before the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    /// Declared identifier, stable for identical inputs
    pub id: String,
    pub package: String,
    /// Full tag form, prerelease marks included
    pub version: String,
    /// Matrix variant suffix, empty for unfanned packages
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
    /// Download URL the entry is published under
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<FileHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ReleaseEntry {
    #[must_use]
    pub fn new(package: &str, tag: &ReleaseTag, variant: &str, url: String) -> Self {
        Self {
            id: declared_id(package, tag, variant),
            package: package.to_string(),
            version: tag.to_string(),
            variant: variant.to_string(),
            url,
            hash: None,
            size: None,
        }
    }

    /// Record the file hash computed at publish time
    pub fn set_hash(&mut self, blake3_hex: String, size: u64) {
        self.hash = Some(FileHash { blake3: blake3_hex });
        self.size = Some(size);
    }

    /// Check the fields every entry must carry
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for an empty id and `InvalidUrl` when the
    /// URL is empty or has no scheme.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(ManifestError::InvalidIndex {
                message: format!("entry for package {} has an empty id", self.package),
            }
            .into());
        }
        if self.url.is_empty() || !self.url.contains("://") {
            return Err(ManifestError::InvalidUrl {
                package: self.package.clone(),
                url: self.url.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Ordering key: id first, then version, digit runs compared as numbers
    #[must_use]
    pub fn sort_key(&self) -> (SortKey, SortKey) {
        (SortKey::of(&self.id), SortKey::of(&self.version))
    }
}

/// Declared identifier of a release entry
///
/// A pure function of its inputs: repacking the same package for the same
/// tag and variant always yields the same identifier.
#[must_use]
pub fn declared_id(package: &str, tag: &ReleaseTag, variant: &str) -> String {
    if variant.is_empty() {
        format!("{package}-{tag}")
    } else {
        format!("{package}-{tag}-{variant}")
    }
}

/// Read one install descriptor written by a pack stage
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON.
pub async fn load_entry(path: &Path) -> Result<ReleaseEntry, Error> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    serde_json::from_str(&content).map_err(|e| {
        ManifestError::ParseError {
            message: format!("{}: {e}", path.display()),
        }
        .into()
    })
}

/// Ordering key that compares digit runs as numbers
///
/// `3.10` sorts after `3.9` and `rc10` after `rc9`; digit runs order
/// before text so prerelease marks follow the bare version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey(Vec<KeyPart>);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Number(u64),
    Text(String),
}

impl SortKey {
    #[must_use]
    pub fn of(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut parts = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let digits = bytes[i].is_ascii_digit();
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() == digits {
                i += 1;
            }
            let run = &text[start..i];
            if digits {
                // Runs too long for u64 fall back to text comparison
                match run.parse::<u64>() {
                    Ok(n) => parts.push(KeyPart::Number(n)),
                    Err(_) => parts.push(KeyPart::Text(run.to_string())),
                }
            } else {
                parts.push(KeyPart::Text(run.to_string()));
            }
        }
        Self(parts)
    }
}

/// What a merge did, per package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries added, keyed by package name
    pub added: BTreeMap<String, usize>,
    /// Ids that already existed with different content and were replaced
    pub divergent: Vec<String>,
    /// Identical entries skipped
    pub unchanged: usize,
}

impl MergeReport {
    #[must_use]
    pub fn added_total(&self) -> usize {
        self.added.values().sum()
    }
}

/// The release index: package name to published releases, newest first
///
/// Key order is deterministic so saving the same index twice produces
/// identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseIndex {
    #[serde(default)]
    pub packages: BTreeMap<String, Vec<ReleaseEntry>>,
}

impl ReleaseIndex {
    /// Load the index, treating a missing file as an empty index
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::io_with_path(&e, path)),
        };
        serde_json::from_str(&content).map_err(|e| {
            ManifestError::ParseError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Write the index as pretty JSON via a temp file and rename
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            Error::from(ManifestError::SerializeError {
                message: e.to_string(),
            })
        })?;
        write_atomic(path, &json).await
    }

    /// Merge newly built entries into the index
    ///
    /// The batch is sorted by [`ReleaseEntry::sort_key`] and placed at the
    /// front of each package's list, so the newest release block leads.
    /// An entry whose id is already present is skipped when identical and
    /// replaced in place when it diverges; replacements are reported so
    /// the caller can warn.
    ///
    /// # Errors
    ///
    /// Returns an error for an entry that fails [`ReleaseEntry::validate`]
    /// or carries no hash.
    pub fn merge(&mut self, entries: Vec<ReleaseEntry>) -> Result<MergeReport, Error> {
        let mut batch = entries;
        batch.sort_by_cached_key(ReleaseEntry::sort_key);

        let mut report = MergeReport::default();
        // Reverse insertion at the front keeps the batch's sorted order
        for entry in batch.into_iter().rev() {
            entry.validate()?;
            if entry.hash.is_none() {
                return Err(ManifestError::MissingHash {
                    id: entry.id.clone(),
                }
                .into());
            }
            let versions = self.packages.entry(entry.package.clone()).or_default();
            match versions.iter().position(|e| e.id == entry.id) {
                Some(pos) if versions[pos] == entry => report.unchanged += 1,
                Some(pos) => {
                    report.divergent.push(entry.id.clone());
                    versions[pos] = entry;
                }
                None => {
                    *report.added.entry(entry.package.clone()).or_insert(0) += 1;
                    versions.insert(0, entry);
                }
            }
        }
        report.divergent.sort();
        Ok(report)
    }

    /// All published releases of a package, or an empty slice
    #[must_use]
    pub fn versions(&self, package: &str) -> &[ReleaseEntry] {
        self.packages.get(package).map_or(&[], Vec::as_slice)
    }

    /// The entries of one release of a package, all variants
    ///
    /// # Errors
    ///
    /// Returns `PackageNotFound` or `VersionNotFound`.
    pub fn release(&self, package: &str, version: &str) -> Result<Vec<&ReleaseEntry>, Error> {
        let versions = self
            .packages
            .get(package)
            .ok_or_else(|| ManifestError::PackageNotFound {
                package: package.to_string(),
            })?;
        let matched: Vec<&ReleaseEntry> =
            versions.iter().filter(|e| e.version == version).collect();
        if matched.is_empty() {
            return Err(ManifestError::VersionNotFound {
                package: package.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        Ok(matched)
    }

    /// The newest release of a package by sort key
    #[must_use]
    pub fn latest(&self, package: &str) -> Option<&ReleaseEntry> {
        self.packages
            .get(package)?
            .iter()
            .max_by_key(|e| e.sort_key())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.values().all(Vec::is_empty)
    }

    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }
}

/// Manifest of the entries added by one release, written next to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub versions: Vec<ReleaseEntry>,
}

impl ReleaseManifest {
    #[must_use]
    pub fn new(versions: Vec<ReleaseEntry>) -> Self {
        Self { versions }
    }

    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            Error::from(ManifestError::SerializeError {
                message: e.to_string(),
            })
        })?;
        write_atomic(path, &json).await
    }
}

/// Path of the per-release manifest next to the index
///
/// `index.json` for tag `3.14.0rc1` becomes `index.3.14.0rc1.json`; the
/// tag keeps its prerelease marks so every prerelease gets its own file.
#[must_use]
pub fn manifest_path(index_path: &Path, tag: &ReleaseTag) -> PathBuf {
    let stem = index_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("index");
    index_path.with_file_name(format!("{stem}.{tag}.json"))
}

async fn write_atomic(path: &Path, json: &str) -> Result<(), Error> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .map_err(|e| Error::io_with_path(&e, &tmp))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(())
}
