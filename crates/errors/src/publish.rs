//! Upload and CDN purge error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PublishError {
    #[error("upload of {file} to {destination} failed: {message}")]
    UploadFailed {
        file: String,
        destination: String,
        message: String,
    },

    #[error("remote command on {host} failed: {message}")]
    RemoteCommandFailed { host: String, message: String },

    #[error("transfer tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("URL {url} is outside the download prefix {prefix}")]
    UrlOutsidePrefix { url: String, prefix: String },

    #[error("purge of {url} failed with status {status}")]
    PurgeFailed { url: String, status: u16 },

    #[error("purge request for {url} failed: {message}")]
    PurgeRequestFailed { url: String, message: String },

    #[error("nothing to publish: {message}")]
    NothingToPublish { message: String },
}

impl UserFacingError for PublishError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UploadFailed { .. } | Self::RemoteCommandFailed { .. } => {
                Some("Check SSH access to the download host and retry the publish step.")
            }
            Self::ToolNotFound { .. } => {
                Some("Install the transfer tool or point the config at an alternative binary.")
            }
            Self::UrlOutsidePrefix { .. } => {
                Some("Download URLs must live under the configured download prefix.")
            }
            Self::PurgeFailed { .. } | Self::PurgeRequestFailed { .. } => {
                Some("The CDN may be degraded; re-run the purge once it recovers.")
            }
            Self::NothingToPublish { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed { .. }
                | Self::RemoteCommandFailed { .. }
                | Self::PurgeFailed { .. }
                | Self::PurgeRequestFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UploadFailed { .. } => "publish.upload_failed",
            Self::RemoteCommandFailed { .. } => "publish.remote_command_failed",
            Self::ToolNotFound { .. } => "publish.tool_not_found",
            Self::UrlOutsidePrefix { .. } => "publish.url_outside_prefix",
            Self::PurgeFailed { .. } => "publish.purge_failed",
            Self::PurgeRequestFailed { .. } => "publish.purge_request_failed",
            Self::NothingToPublish { .. } => "publish.nothing_to_publish",
        };
        Some(code)
    }
}
