use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::error::StorageError;

/// Metadata sidecar suffix: `paper.pdf` -> `paper.pdf.meta.json`
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar metadata path for a document file
pub fn sidecar_path_for(document: &Path) -> PathBuf {
    let mut name = document.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Move a file, refusing to overwrite an existing destination.
///
/// Tries a rename first and falls back to copy + remove when the rename
/// fails (e.g. across devices). If the source cannot be removed after a
/// successful copy, the copy is deleted again so the file exists exactly once.
pub fn move_file(src: &Path, dest: &Path) -> Result<(), StorageError> {
    if dest.exists() {
        return Err(StorageError::DestinationExists(dest.to_path_buf()));
    }
    debug!("Moving file from {:?} to {:?}", src, dest);

    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    if let Err(e) = fs::copy(src, dest) {
        error!("Failed to copy file from {:?} to {:?}: {}", src, dest, e);
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src) {
        error!("Failed to remove original file {:?} after copy: {}", src, e);
        let _ = fs::remove_file(dest);
        return Err(e.into());
    }

    Ok(())
}

/// Move a document and its sidecar (if any) into `dest_dir`.
///
/// Returns the new document path. A sidecar that fails to move after the
/// document has moved causes the document to be moved back, so the pair
/// never ends up split across directories.
pub fn move_with_sidecar(document: &Path, dest_dir: &Path) -> Result<PathBuf, StorageError> {
    let file_name = document
        .file_name()
        .ok_or_else(|| StorageError::DocumentNotFound(document.display().to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let new_document = dest_dir.join(file_name);
    move_file(document, &new_document)?;

    let sidecar = sidecar_path_for(document);
    if sidecar.exists() {
        let new_sidecar = sidecar_path_for(&new_document);
        if let Err(e) = move_file(&sidecar, &new_sidecar) {
            warn!("Failed to move sidecar {:?}: {}. Restoring document.", sidecar, e);
            if let Err(restore_err) = move_file(&new_document, document) {
                error!(
                    "Failed to restore {:?} after sidecar failure: {}",
                    document, restore_err
                );
            }
            return Err(e);
        }
    }

    Ok(new_document)
}
