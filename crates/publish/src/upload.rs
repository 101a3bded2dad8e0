//! Uploads to the release file server over external transfer tools

use shipwright_config::PublishConfig;
use shipwright_errors::{Error, PublishError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, PublishEvent};
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;

/// Uploads release files and runs remote commands on the download host
///
/// Every operation is skipped with an event when no upload host is
/// configured, so a publish against a local index never needs SSH.
pub struct Uploader {
    config: PublishConfig,
    tx: EventSender,
}

impl Uploader {
    #[must_use]
    pub fn new(config: PublishConfig, tx: EventSender) -> Self {
        Self { config, tx }
    }

    /// Whether uploads will actually run
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.upload_host.is_some()
    }

    /// Map a download URL to its path on the file server
    ///
    /// # Errors
    ///
    /// Returns `UrlOutsidePrefix` when the URL does not live under the
    /// configured download prefix.
    pub fn url_to_path(&self, url: &str) -> Result<String, Error> {
        let rest = url
            .strip_prefix(&self.config.download_url_prefix)
            .ok_or_else(|| PublishError::UrlOutsidePrefix {
                url: url.to_string(),
                prefix: self.config.download_url_prefix.clone(),
            })?;
        Ok(format!("{}{rest}", self.config.download_path_prefix))
    }

    /// Upload one file, creating the remote directory first
    ///
    /// Runs the post-upload command template afterwards when one is
    /// configured, with `${path}` expanded to the remote path.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer tool is missing, the transfer
    /// fails, or a remote command exits non-zero.
    pub async fn upload_file(&self, source: &Path, dest: &str) -> Result<(), Error> {
        let Some(host) = self.config.upload_host.clone() else {
            self.tx.emit(AppEvent::Publish(PublishEvent::UploadSkipped {
                file: source.to_path_buf(),
                reason: "no upload host configured".to_string(),
            }));
            return Ok(());
        };

        let started = Instant::now();
        self.tx.emit(AppEvent::Publish(PublishEvent::UploadStarted {
            file: source.to_path_buf(),
            destination: dest.to_string(),
        }));

        if let Some((dir, _)) = dest.rsplit_once('/') {
            self.remote_command(&host, &format!("mkdir -p {dir}")).await?;
        }
        self.transfer(&host, source, dest).await?;
        if let Some(template) = &self.config.post_upload_command {
            let command = template.replace("${path}", dest);
            self.remote_command(&host, &command).await?;
        }

        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| Error::io_with_path(&e, source))?
            .len();
        self.tx.emit(AppEvent::Publish(PublishEvent::UploadCompleted {
            file: source.to_path_buf(),
            destination: dest.to_string(),
            size,
            duration: started.elapsed(),
        }));
        Ok(())
    }

    fn target(&self, host: &str) -> String {
        match &self.config.upload_user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    async fn remote_command(&self, host: &str, command: &str) -> Result<(), Error> {
        let target = self.target(host);
        let output = Command::new(&self.config.ssh_command)
            .args([target.as_str(), command])
            .output()
            .await
            .map_err(|e| spawn_error(&self.config.ssh_command, &e))?;
        if !output.status.success() {
            return Err(PublishError::RemoteCommandFailed {
                host: host.to_string(),
                message: failure_message(&output),
            }
            .into());
        }
        Ok(())
    }

    async fn transfer(&self, host: &str, source: &Path, dest: &str) -> Result<(), Error> {
        let target = format!("{}:{dest}", self.target(host));
        let output = Command::new(&self.config.scp_command)
            .arg(source)
            .arg(&target)
            .output()
            .await
            .map_err(|e| spawn_error(&self.config.scp_command, &e))?;
        if !output.status.success() {
            return Err(PublishError::UploadFailed {
                file: source.display().to_string(),
                destination: dest.to_string(),
                message: failure_message(&output),
            }
            .into());
        }
        Ok(())
    }
}

fn spawn_error(tool: &str, err: &std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        PublishError::ToolNotFound {
            tool: tool.to_string(),
        }
        .into()
    } else {
        Error::internal(format!("failed to run {tool}: {err}"))
    }
}

fn failure_message(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = stderr.trim();
    if text.is_empty() {
        format!("exited with status {}", output.status)
    } else {
        text.to_string()
    }
}
