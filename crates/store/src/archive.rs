//! Artifact archive export and import

use crate::receipt::RECEIPT_FILE;
use shipwright_errors::{Error, StoreError};
use std::path::Path;
use tar::Archive;
use tokio::fs;

/// Pack a stored artifact directory into a tar archive
///
/// The archive holds the receipt and the payload exactly as stored, so
/// an import on another host reproduces the artifact byte for byte.
///
/// # Errors
///
/// Returns an error if:
/// - The source directory has no receipt
/// - Archive creation fails
/// - I/O operations fail
pub async fn export_artifact(src: &Path, archive_path: &Path) -> Result<(), Error> {
    let receipt_path = src.join(RECEIPT_FILE);
    if !fs::try_exists(&receipt_path).await.unwrap_or(false) {
        return Err(StoreError::CorruptedData {
            message: format!("{}: missing {RECEIPT_FILE}", src.display()),
        }
        .into());
    }

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let src = src.to_path_buf();
    let archive_path = archive_path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use std::fs::File;
        use std::io::BufWriter;

        let file = File::create(&archive_path)?;
        let buf_writer = BufWriter::new(file);
        let mut builder = tar::Builder::new(buf_writer);

        // Deterministic output so re-exports of the same artifact match
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        add_dir_to_tar(&mut builder, &src, Path::new(""))?;

        builder.finish()?;

        Ok::<(), Error>(())
    })
    .await
    .map_err(|e| Error::internal(format!("export task failed: {e}")))??;

    Ok(())
}

/// Unpack an exported artifact archive into a directory
///
/// # Errors
///
/// Returns an error if:
/// - Tar extraction fails
/// - The extracted artifact is missing its receipt
/// - I/O operations fail
pub async fn import_artifact(archive_path: &Path, dest: &Path) -> Result<(), Error> {
    extract_tar_file(archive_path, dest).await?;

    let receipt_path = dest.join(RECEIPT_FILE);
    if !fs::try_exists(&receipt_path).await.unwrap_or(false) {
        return Err(StoreError::CorruptedReceipt {
            message: format!("archive {} has no {RECEIPT_FILE}", archive_path.display()),
        }
        .into());
    }

    Ok(())
}

/// Extract a tar archive from a file
async fn extract_tar_file(file_path: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    let file_path = file_path.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use std::fs::File;

        let file = File::open(&file_path)
            .map_err(|e| Error::from(StoreError::from_io_with_path(&e, &file_path)))?;
        let mut archive = Archive::new(file);

        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_unpack_xattrs(false);

        for entry in archive.entries()? {
            let mut entry = entry?;

            let path = entry.path()?;
            if path
                .components()
                .any(|c| c == std::path::Component::ParentDir)
            {
                return Err(StoreError::CorruptedData {
                    message: "archive contains path traversal".to_string(),
                }
                .into());
            }

            entry.unpack_in(&dest)?;
        }

        Ok::<(), Error>(())
    })
    .await
    .map_err(|e| Error::internal(format!("import task failed: {e}")))??;

    Ok(())
}

/// Recursively add directory contents to tar
fn add_dir_to_tar<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    src: &Path,
    prefix: &Path,
) -> Result<(), Error> {
    let entries = std::fs::read_dir(src).map_err(StoreError::from)?;

    for entry in entries {
        let entry = entry.map_err(StoreError::from)?;

        let path = entry.path();
        let name = entry.file_name();
        let tar_path = prefix.join(&name);

        let metadata = std::fs::symlink_metadata(&path).map_err(StoreError::from)?;

        if metadata.is_dir() {
            builder
                .append_dir(&tar_path, &path)
                .map_err(StoreError::from)?;

            add_dir_to_tar(builder, &path, &tar_path)?;
        } else if metadata.is_symlink() {
            let target = std::fs::read_link(&path).map_err(StoreError::from)?;

            let mut header = tar::Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_entry_type(tar::EntryType::Symlink);

            builder
                .append_link(&mut header, &tar_path, &target)
                .map_err(StoreError::from)?;
        } else {
            let mut file = std::fs::File::open(&path).map_err(StoreError::from)?;

            builder
                .append_file(&tar_path, &mut file)
                .map_err(StoreError::from)?;
        }
    }

    Ok(())
}
