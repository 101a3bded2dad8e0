//! CDN purge for released files

use crate::http::HttpClient;
use shipwright_config::{NetworkConfig, PublishConfig};
use shipwright_errors::{Error, PublishError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, PublishEvent};
use shipwright_types::ReleaseTag;
use std::time::Instant;

/// Issues soft-purge requests against the CDN
pub struct CdnPurger {
    client: HttpClient,
    tx: EventSender,
}

impl CdnPurger {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to initialize.
    pub fn new(network: &NetworkConfig, tx: EventSender) -> Result<Self, Error> {
        Ok(Self {
            client: HttpClient::new(network)?,
            tx,
        })
    }

    /// Purge every URL, then fail if any response was not a success
    ///
    /// Transport failures abort immediately after their retries; HTTP
    /// failures are collected so the remaining URLs still get purged.
    ///
    /// # Errors
    ///
    /// Returns `PurgeRequestFailed` for a transport failure and
    /// `PurgeFailed` for the first non-success response.
    pub async fn purge_all(&self, urls: &[String]) -> Result<(), Error> {
        let started = Instant::now();
        self.tx.emit(AppEvent::Publish(PublishEvent::PurgeStarted {
            urls: urls.len(),
        }));

        let mut purged = 0usize;
        let mut failed: Vec<(String, u16)> = Vec::new();
        for url in urls {
            let status = self.client.purge(url).await?;
            let ok = status.is_success();
            self.tx.emit(AppEvent::Publish(PublishEvent::PurgeResult {
                url: url.clone(),
                status: status.as_u16(),
                ok,
            }));
            if ok {
                purged += 1;
            } else {
                failed.push((url.clone(), status.as_u16()));
            }
        }

        self.tx.emit(AppEvent::Publish(PublishEvent::PurgeCompleted {
            purged,
            failed: failed.len(),
            duration: started.elapsed(),
        }));

        if let Some((url, status)) = failed.into_iter().next() {
            return Err(PublishError::PurgeFailed { url, status }.into());
        }
        Ok(())
    }
}

/// Standing purge list for one release
///
/// Top-level files sit in the release directory named after the
/// normalized version; variant files sit in per-variant subdirectories
/// carrying the tag's prerelease marker, the layout pack stages publish
/// into. Every path also gets its `.sig` sibling.
#[must_use]
pub fn release_purge_urls(base_url: &str, tag: &ReleaseTag, config: &PublishConfig) -> Vec<String> {
    let dir = format!("{}/{}/", base_url.trim_end_matches('/'), tag.normalized());
    let version = tag.to_string();
    let marker = version
        .strip_prefix(&tag.normalized())
        .unwrap_or("")
        .to_string();

    let mut paths: Vec<String> = Vec::new();
    for file in &config.purge_top_level {
        paths.push(file.replace("${VERSION}", &version));
    }
    for variant in &config.purge_variants {
        for file in &config.purge_variant_files {
            paths.push(format!("{variant}{marker}/{file}"));
        }
    }

    let sigs: Vec<String> = paths.iter().map(|p| format!("{p}.sig")).collect();
    paths.extend(sigs);
    paths.into_iter().map(|p| format!("{dir}{p}")).collect()
}
