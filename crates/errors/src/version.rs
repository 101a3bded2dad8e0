//! Release tag parsing error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid release tag: {input}")]
    InvalidTag { input: String },

    #[error("invalid phase suffix in {input}: {suffix}")]
    InvalidPhase { input: String, suffix: String },

    #[error("non-numeric component in {input}: {component}")]
    InvalidComponent { input: String, component: String },

    #[error("serial missing after phase marker in {input}")]
    MissingSerial { input: String },

    #[error("version parse error: {message}")]
    ParseError { message: String },
}

impl UserFacingError for VersionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidTag { .. } | Self::ParseError { .. } => {
                Some("Use tags like 3.12.0, 3.13.0a2, 3.13.0b1, or 3.13.0rc1.")
            }
            Self::InvalidPhase { .. } => {
                Some("Pre-release phases are `a`, `b`, and `rc`, followed by a serial.")
            }
            Self::InvalidComponent { .. } | Self::MissingSerial { .. } => {
                Some("Release tags are major.minor.micro with an optional phase suffix.")
            }
        }
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidTag { .. } => "version.invalid_tag",
            Self::InvalidPhase { .. } => "version.invalid_phase",
            Self::InvalidComponent { .. } => "version.invalid_component",
            Self::MissingSerial { .. } => "version.missing_serial",
            Self::ParseError { .. } => "version.parse_error",
        };
        Some(code)
    }
}
