//! Signing gate error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SigningError {
    #[error("signature verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("no trusted key found for signature with key id: {key_id}")]
    NoTrustedKeyFound { key_id: String },

    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("invalid public key format: {0}")]
    InvalidPublicKey(String),

    #[error("credentials missing for group {group}: {missing}")]
    CredentialsMissing { group: String, missing: String },

    #[error("unknown credential group: {group}")]
    UnknownGroup { group: String },

    #[error("signing authority failed for {artifact}: {message}")]
    AuthorityFailed { artifact: String, message: String },

    #[error("signing authority exhausted {attempts} attempts for {artifact}: {last_error}")]
    RetriesExhausted {
        artifact: String,
        attempts: u32,
        last_error: String,
    },

    #[error("authority returned no signature for {artifact}")]
    EmptySignature { artifact: String },

    #[error("artifact {artifact} has no embedded signature")]
    NoEmbeddedSignature { artifact: String },

    #[error("signing key error: {message}")]
    KeyError { message: String },
}

impl UserFacingError for SigningError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CredentialsMissing { .. } => {
                Some("Export the listed credentials or run the pipeline unsigned.")
            }
            Self::VerificationFailed { .. } | Self::NoTrustedKeyFound { .. } => {
                Some("Confirm the authority signs with a key matching the configured public key.")
            }
            Self::RetriesExhausted { .. } | Self::AuthorityFailed { .. } => {
                Some("Check the signing service, then resume the run to retry the stage.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthorityFailed { .. } | Self::RetriesExhausted { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::VerificationFailed { .. } => "signing.verification_failed",
            Self::NoTrustedKeyFound { .. } => "signing.no_trusted_key_found",
            Self::InvalidSignatureFormat(_) => "signing.invalid_signature_format",
            Self::InvalidPublicKey(_) => "signing.invalid_public_key",
            Self::CredentialsMissing { .. } => "signing.credentials_missing",
            Self::UnknownGroup { .. } => "signing.unknown_group",
            Self::AuthorityFailed { .. } => "signing.authority_failed",
            Self::RetriesExhausted { .. } => "signing.retries_exhausted",
            Self::EmptySignature { .. } => "signing.empty_signature",
            Self::NoEmbeddedSignature { .. } => "signing.no_embedded_signature",
            Self::KeyError { .. } => "signing.key_error",
        };
        Some(code)
    }
}
