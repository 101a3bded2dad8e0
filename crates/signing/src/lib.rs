#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Signing gate for release files
//!
//! Routes stage outputs through a signing authority according to the
//! run's credential group. The `unsigned` group is a hard bypass: no
//! authority is ever contacted. For signing groups, each file is
//! hashed, submitted, the returned signature verified against the
//! group's trusted public key, written as a detached `.sig` sidecar,
//! and embedded into the file as a framed trailer.

mod authority;
mod embed;
mod keys;
mod retry;

pub use authority::{CommandAuthority, LocalKeyAuthority, SigningAuthority};
pub use embed::{
    append_trailer, embed_in_file, split_trailer, strip_embedded, verify_embedded, TRAILER_MAGIC,
};
pub use keys::CredentialGroup;
pub use retry::RetryPolicy;

use minisign_verify::{PublicKey, Signature};
use retry::calculate_backoff_delay;
use shipwright_config::SigningConfig;
use shipwright_errors::{Error, SigningError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, FailureContext, SigningEvent};
use shipwright_hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// The signing gate for one credential group
pub struct SigningGate {
    group_name: String,
    group: CredentialGroup,
    authority: Option<Arc<dyn SigningAuthority>>,
    policy: RetryPolicy,
    tx: EventSender,
}

impl SigningGate {
    /// Build a gate for a named group from the signing configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the group is unknown or its credentials
    /// are incomplete.
    pub fn from_config(name: &str, config: &SigningConfig, tx: EventSender) -> Result<Self, Error> {
        let group = CredentialGroup::resolve(name, config)?;
        let policy = RetryPolicy::new(
            config.attempts,
            Duration::from_millis(config.retry_delay_ms),
        );
        Ok(Self::new(name.to_string(), group, policy, tx))
    }

    /// Build a gate from an already-resolved credential group
    #[must_use]
    pub fn new(
        group_name: String,
        group: CredentialGroup,
        policy: RetryPolicy,
        tx: EventSender,
    ) -> Self {
        let authority: Option<Arc<dyn SigningAuthority>> = match &group {
            CredentialGroup::Unsigned => None,
            CredentialGroup::Minisign {
                secret_key_path, ..
            } => Some(Arc::new(LocalKeyAuthority::new(secret_key_path.clone()))),
            CredentialGroup::Command { argv, .. } => {
                Some(Arc::new(CommandAuthority::new(argv.clone())))
            }
        };
        Self {
            group_name,
            group,
            authority,
            policy,
            tx,
        }
    }

    /// Replace the authority, keeping the group's trusted key
    ///
    /// Lets tests substitute a mock authority behind a real group.
    #[must_use]
    pub fn with_authority(mut self, authority: Arc<dyn SigningAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// The resolved credential group
    #[must_use]
    pub fn group(&self) -> &CredentialGroup {
        &self.group
    }

    /// Whether this gate passes files through without signing
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.group.is_unsigned()
    }

    /// Sign a set of files in place
    ///
    /// Returns the detached sidecar paths written, one per input file;
    /// empty for the `unsigned` group.
    ///
    /// # Errors
    ///
    /// Returns an error when the authority stays unreachable past the
    /// retry budget or a returned signature fails verification.
    pub async fn sign_files(&self, instance: &str, files: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
        self.tx.emit(AppEvent::Signing(SigningEvent::GateStarted {
            instance: instance.to_string(),
            group: self.group_name.clone(),
            files: files.len(),
        }));

        if self.group.is_unsigned() {
            self.tx.emit(AppEvent::Signing(SigningEvent::SigningSkipped {
                instance: instance.to_string(),
                group: self.group_name.clone(),
            }));
            return Ok(Vec::new());
        }

        let mut sidecars = Vec::with_capacity(files.len());
        for file in files {
            match self.sign_one(file).await {
                Ok(sidecar) => sidecars.push(sidecar),
                Err(e) => {
                    self.tx.emit(AppEvent::Signing(SigningEvent::Failed {
                        file: file.clone(),
                        failure: FailureContext::from_error(&e),
                    }));
                    return Err(e);
                }
            }
        }

        Ok(sidecars)
    }

    async fn sign_one(&self, file: &Path) -> Result<PathBuf, Error> {
        let hash = Hash::hash_file(file).await?;
        let signature_str = self.submit_with_retry(file, &hash).await?;

        if signature_str.trim().is_empty() {
            return Err(SigningError::EmptySignature {
                artifact: file.display().to_string(),
            }
            .into());
        }

        self.verify_signature(file, &signature_str).await?;
        self.tx.emit(AppEvent::Signing(SigningEvent::Verified {
            file: file.to_path_buf(),
        }));

        let sidecar = sidecar_path(file);
        fs::write(&sidecar, &signature_str)
            .await
            .map_err(|e| Error::io_with_path(&e, &sidecar))?;

        embed::embed_in_file(file, &signature_str).await?;
        self.tx.emit(AppEvent::Signing(SigningEvent::Signed {
            file: file.to_path_buf(),
            signature_size: signature_str.len(),
        }));

        Ok(sidecar)
    }

    async fn submit_with_retry(&self, file: &Path, hash: &Hash) -> Result<String, Error> {
        let authority = self.authority.as_ref().ok_or_else(|| {
            Error::from(SigningError::KeyError {
                message: format!("group {} has no signing authority", self.group_name),
            })
        })?;

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=self.policy.attempts {
            self.tx.emit(AppEvent::Signing(SigningEvent::Submitted {
                file: file.to_path_buf(),
                attempt,
                max_attempts: self.policy.attempts,
            }));

            match authority.sign(file, hash).await {
                Ok(signature) => return Ok(signature),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.policy.attempts {
                        let delay = calculate_backoff_delay(&self.policy, attempt);
                        self.tx
                            .emit(AppEvent::Signing(SigningEvent::RetryScheduled {
                                file: file.to_path_buf(),
                                attempt,
                                delay_ms: u64::try_from(delay.as_millis())
                                    .unwrap_or(u64::MAX),
                                error: last_error.clone(),
                            }));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SigningError::RetriesExhausted {
            artifact: file.display().to_string(),
            attempts: self.policy.attempts,
            last_error,
        }
        .into())
    }

    async fn verify_signature(&self, file: &Path, signature_str: &str) -> Result<(), Error> {
        let public_key = self.group.public_key().ok_or_else(|| {
            Error::from(SigningError::KeyError {
                message: format!("group {} has no trusted public key", self.group_name),
            })
        })?;

        let signature = Signature::decode(signature_str)
            .map_err(|e| SigningError::InvalidSignatureFormat(e.to_string()))?;
        let pk = PublicKey::from_base64(public_key)
            .map_err(|e| SigningError::InvalidPublicKey(e.to_string()))?;

        let content = fs::read(file)
            .await
            .map_err(|e| Error::io_with_path(&e, file))?;

        // The authority must have signed exactly what we hashed
        pk.verify(&content, &signature, false)
            .map_err(|e| SigningError::VerificationFailed {
                reason: format!("{}: {e}", file.display()),
            })?;

        Ok(())
    }
}

/// The detached sidecar path for a signed file
#[must_use]
pub fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".sig");
    file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_appends_suffix() {
        let file = Path::new("/tmp/release/python-3.14.0-installer.exe");
        assert_eq!(
            sidecar_path(file),
            Path::new("/tmp/release/python-3.14.0-installer.exe.sig")
        );
    }

    #[test]
    fn test_sidecar_path_keeps_existing_extension() {
        let file = Path::new("pkg.tar.gz");
        assert_eq!(sidecar_path(file), Path::new("pkg.tar.gz.sig"));
    }
}
