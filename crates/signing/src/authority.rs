//! Signing authorities
//!
//! An authority turns a file into a minisign signature string. The
//! production path shells out to an external signing client; test
//! releases sign with a local minisign key instead.

use async_trait::async_trait;
use minisign::{SecretKeyBox, SignatureBox};
use shipwright_errors::{Error, SigningError};
use shipwright_hash::Hash;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

/// Produces minisign signatures for release files
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    /// Authority name for events and errors
    fn name(&self) -> &str;

    /// Sign one file, returning the full minisign signature text
    async fn sign(&self, file: &Path, hash: &Hash) -> Result<String, Error>;
}

/// External authority invoked as a command per file
///
/// The command template expands `${file}` to the file path and
/// `${hash}` to its BLAKE3 hex digest; the signature is read from
/// stdout.
pub struct CommandAuthority {
    argv: Vec<String>,
}

impl CommandAuthority {
    /// Create an authority from a non-empty argv template
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn expand(&self, file: &Path, hash: &Hash) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("${file}", &file.display().to_string())
                    .replace("${hash}", &hash.to_hex())
            })
            .collect()
    }
}

#[async_trait]
impl SigningAuthority for CommandAuthority {
    fn name(&self) -> &str {
        self.argv.first().map_or("command", String::as_str)
    }

    async fn sign(&self, file: &Path, hash: &Hash) -> Result<String, Error> {
        let argv = self.expand(file, hash);
        let (program, args) = argv.split_first().ok_or_else(|| {
            Error::from(SigningError::KeyError {
                message: "empty authority command".to_string(),
            })
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SigningError::AuthorityFailed {
                artifact: file.display().to_string(),
                message: format!("failed to spawn {program}: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SigningError::AuthorityFailed {
                artifact: file.display().to_string(),
                message: format!(
                    "{program} exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            }
            .into());
        }

        let signature = String::from_utf8_lossy(&output.stdout).into_owned();
        if signature.trim().is_empty() {
            return Err(SigningError::EmptySignature {
                artifact: file.display().to_string(),
            }
            .into());
        }

        Ok(signature)
    }
}

/// Local minisign key authority for test releases
pub struct LocalKeyAuthority {
    secret_key_path: PathBuf,
}

impl LocalKeyAuthority {
    #[must_use]
    pub fn new(secret_key_path: PathBuf) -> Self {
        Self { secret_key_path }
    }
}

#[async_trait]
impl SigningAuthority for LocalKeyAuthority {
    fn name(&self) -> &str {
        "local minisign key"
    }

    async fn sign(&self, file: &Path, _hash: &Hash) -> Result<String, Error> {
        let key_data =
            fs::read_to_string(&self.secret_key_path)
                .await
                .map_err(|e| SigningError::KeyError {
                    message: format!(
                        "failed to read secret key {}: {e}",
                        self.secret_key_path.display()
                    ),
                })?;

        let sk_box = SecretKeyBox::from_string(&key_data).map_err(|e| SigningError::KeyError {
            message: format!("failed to parse secret key: {e}"),
        })?;

        let secret_key = sk_box
            .into_secret_key(None)
            .map_err(|e| SigningError::KeyError {
                message: format!("failed to decrypt secret key: {e}"),
            })?;

        let content = fs::read(file)
            .await
            .map_err(|e| Error::io_with_path(&e, file))?;

        let untrusted_comment = format!(
            "signature from shipwright for {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        );

        let signature: SignatureBox = minisign::sign(
            None,
            &secret_key,
            Cursor::new(&content),
            Some("shipwright release signature"),
            Some(&untrusted_comment),
        )
        .map_err(|e| SigningError::AuthorityFailed {
            artifact: file.display().to_string(),
            message: format!("failed to create signature: {e}"),
        })?;

        Ok(signature.into_string())
    }
}
