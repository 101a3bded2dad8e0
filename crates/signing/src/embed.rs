//! Embedded signature trailer
//!
//! A signed file carries its minisign signature twice: as a detached
//! `<file>.sig` sidecar and appended to the file itself in a framed
//! trailer. The trailer layout is magic, signature length (u32 LE),
//! signature text, magic, so a verifier can split the original bytes
//! back out of the file without the sidecar.

use minisign_verify::{PublicKey, Signature};
use shipwright_errors::{Error, SigningError};
use std::path::Path;
use tokio::fs;

/// Trailer frame marker
pub const TRAILER_MAGIC: &[u8; 8] = b"SHPWSIG1";

/// Append a framed signature trailer to a byte buffer
pub fn append_trailer(data: &mut Vec<u8>, signature: &str) {
    let sig_bytes = signature.as_bytes();
    data.extend_from_slice(TRAILER_MAGIC);
    #[allow(clippy::cast_possible_truncation)]
    data.extend_from_slice(&(sig_bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(sig_bytes);
    data.extend_from_slice(TRAILER_MAGIC);
}

/// Split a buffer into original content and embedded signature
///
/// # Errors
///
/// Returns `NoEmbeddedSignature` when the buffer carries no trailer and
/// `InvalidSignatureFormat` when a trailer is present but malformed.
pub fn split_trailer(data: &[u8]) -> Result<(&[u8], &str), Error> {
    let magic_len = TRAILER_MAGIC.len();
    // magic + length + magic with an empty signature
    let min_len = magic_len * 2 + 4;
    if data.len() < min_len || &data[data.len() - magic_len..] != TRAILER_MAGIC {
        return Err(SigningError::NoEmbeddedSignature {
            artifact: String::from("buffer"),
        }
        .into());
    }

    // The signature text may itself contain the marker bytes, so walk
    // candidate leading-magic positions from the end until the recorded
    // length matches the frame.
    let frame_end = data.len() - magic_len;
    let mut search_end = frame_end;
    while let Some(pos) = rfind_magic(&data[..search_end]) {
        let len_start = pos + magic_len;
        if len_start + 4 <= frame_end {
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&data[len_start..len_start + 4]);
            let sig_len = usize::try_from(u32::from_le_bytes(len_bytes)).unwrap_or(usize::MAX);
            if frame_end - (len_start + 4) == sig_len {
                let sig_bytes = &data[len_start + 4..frame_end];
                let signature = std::str::from_utf8(sig_bytes).map_err(|e| {
                    SigningError::InvalidSignatureFormat(format!(
                        "embedded signature is not UTF-8: {e}"
                    ))
                })?;
                return Ok((&data[..pos], signature));
            }
        }
        if pos == 0 {
            break;
        }
        search_end = pos + magic_len - 1;
    }

    Err(SigningError::InvalidSignatureFormat(
        "trailer marker found but frame is inconsistent".to_string(),
    )
    .into())
}

fn rfind_magic(data: &[u8]) -> Option<usize> {
    let magic_len = TRAILER_MAGIC.len();
    if data.len() < magic_len {
        return None;
    }
    (0..=data.len() - magic_len).rev().find(|&i| &data[i..i + magic_len] == TRAILER_MAGIC)
}

/// Append a signature trailer to a file in place
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub async fn embed_in_file(path: &Path, signature: &str) -> Result<(), Error> {
    let mut data = fs::read(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    append_trailer(&mut data, signature);
    fs::write(path, data)
        .await
        .map_err(|e| Error::io_with_path(&e, path))
}

/// Verify a file's embedded signature against a trusted public key
///
/// Splits the trailer and checks the signature over the original
/// content, proving the trailer can be stripped back to the bytes the
/// authority signed.
///
/// # Errors
///
/// Returns an error if the file has no valid trailer, the key or
/// signature cannot be parsed, or verification fails.
pub async fn verify_embedded(path: &Path, public_key: &str) -> Result<(), Error> {
    let data = fs::read(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let (content, signature_str) = split_trailer(&data).map_err(|_| {
        Error::from(SigningError::NoEmbeddedSignature {
            artifact: path.display().to_string(),
        })
    })?;

    let signature = Signature::decode(signature_str)
        .map_err(|e| SigningError::InvalidSignatureFormat(e.to_string()))?;
    let pk = PublicKey::from_base64(public_key)
        .map_err(|e| SigningError::InvalidPublicKey(e.to_string()))?;
    pk.verify(content, &signature, false)
        .map_err(|e| SigningError::VerificationFailed {
            reason: e.to_string(),
        })?;

    Ok(())
}

/// Remove the signature trailer from a file, restoring the original bytes
///
/// # Errors
///
/// Returns an error if the file has no valid trailer or cannot be
/// rewritten.
pub async fn strip_embedded(path: &Path) -> Result<String, Error> {
    let data = fs::read(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let (content, signature) = split_trailer(&data)?;
    let signature = signature.to_string();
    let content = content.to_vec();
    fs::write(path, content)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_round_trip() {
        let original = b"artifact bytes".to_vec();
        let mut data = original.clone();
        append_trailer(&mut data, "untrusted comment: sig\nAAAA\n");

        let (content, sig) = split_trailer(&data).unwrap();
        assert_eq!(content, original.as_slice());
        assert_eq!(sig, "untrusted comment: sig\nAAAA\n");
    }

    #[test]
    fn test_no_trailer() {
        let data = b"plain file with no trailer".to_vec();
        assert!(split_trailer(&data).is_err());
    }

    #[test]
    fn test_signature_containing_magic() {
        let original = b"payload".to_vec();
        let tricky = format!("comment with {} inside\nAAAA\n", "SHPWSIG1");
        let mut data = original.clone();
        append_trailer(&mut data, &tricky);

        let (content, sig) = split_trailer(&data).unwrap();
        assert_eq!(content, original.as_slice());
        assert_eq!(sig, tricky);
    }
}
