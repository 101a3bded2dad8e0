//! Release index and manifest error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ManifestError {
    #[error("failed to parse index: {message}")]
    ParseError { message: String },

    #[error("failed to serialize index: {message}")]
    SerializeError { message: String },

    #[error("invalid index: {message}")]
    InvalidIndex { message: String },

    #[error("package not found in index: {package}")]
    PackageNotFound { package: String },

    #[error("version {version} not found for package {package}")]
    VersionNotFound { package: String, version: String },

    #[error("invalid download URL for {package}: {url}")]
    InvalidUrl { package: String, url: String },

    #[error("entry {id} has no hash")]
    MissingHash { id: String },
}

impl UserFacingError for ManifestError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ParseError { .. } | Self::InvalidIndex { .. } => {
                Some("The existing index is malformed; repair or remove it before merging.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ParseError { .. } => "manifest.parse_error",
            Self::SerializeError { .. } => "manifest.serialize_error",
            Self::InvalidIndex { .. } => "manifest.invalid_index",
            Self::PackageNotFound { .. } => "manifest.package_not_found",
            Self::VersionNotFound { .. } => "manifest.version_not_found",
            Self::InvalidUrl { .. } => "manifest.invalid_url",
            Self::MissingHash { .. } => "manifest.missing_hash",
        };
        Some(code)
    }
}
