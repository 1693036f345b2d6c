//! Moves with overwrite

use crate::error::{ImportError, ImportResult};
use std::path::{Path, PathBuf};

/// Move `src` into `dest_dir`, replacing a file of the same name
pub async fn move_into(src: &Path, dest_dir: &Path) -> ImportResult<PathBuf> {
    let file_name = src
        .file_name()
        .ok_or_else(|| {
            ImportError::fs(
                src,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
    let dest = dest_dir.join(file_name);
    move_to(src, &dest).await?;
    Ok(dest)
}

/// Move `src` to `dest`, replacing an existing file
///
/// Falls back to copy and delete when a rename is not possible (for example
/// across filesystems).
pub async fn move_to(src: &Path, dest: &Path) -> ImportResult<()> {
    if src == dest {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ImportError::fs(parent, e))?;
    }
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        tokio::fs::remove_file(dest)
            .await
            .map_err(|e| ImportError::fs(dest, e))?;
    }

    if let Err(rename_err) = tokio::fs::rename(src, dest).await {
        tracing::debug!(
            src = %src.display(),
            dest = %dest.display(),
            "Rename failed ({}), copying instead",
            rename_err
        );
        tokio::fs::copy(src, dest)
            .await
            .map_err(|e| ImportError::fs(src, e))?;
        tokio::fs::remove_file(src)
            .await
            .map_err(|e| ImportError::fs(src, e))?;
    }
    Ok(())
}
