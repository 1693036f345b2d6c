//! Conflicts holding area
//!
//! A file sitting in the conflicts directory is the whole record of an
//! unresolved conflict. Disc-image parts travel in and out together.

use crate::error::{ImportError, ImportResult};
use crate::models::SystemSnapshot;
use crate::naming;
use crate::services::cd_grouper;
use crate::services::file_ops;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A file waiting for a person to pick its system
#[derive(Debug, Clone, Serialize)]
pub struct HeldConflict {
    pub path: PathBuf,
    pub file_name: String,
    /// Systems claiming the file's extension
    pub candidate_systems: Vec<String>,
}

pub struct ConflictHandler {
    conflicts_dir: PathBuf,
}

impl ConflictHandler {
    pub fn new(conflicts_dir: impl Into<PathBuf>) -> Self {
        Self {
            conflicts_dir: conflicts_dir.into(),
        }
    }

    /// Move a file, and for disc-image parts its siblings, into the holding
    /// area; returns the held path of `path`
    pub async fn hold(&self, path: &Path) -> ImportResult<PathBuf> {
        tokio::fs::create_dir_all(&self.conflicts_dir)
            .await
            .map_err(|e| ImportError::fs(&self.conflicts_dir, e))?;

        if naming::is_cd_file(path) {
            let siblings =
                cd_grouper::find_siblings(path).map_err(|e| ImportError::fs(path, e))?;
            for sibling in siblings {
                match file_ops::move_into(&sibling, &self.conflicts_dir).await {
                    Ok(_) => {}
                    // Taken by another import in the meantime
                    Err(ImportError::Filesystem { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        tracing::debug!(path = %sibling.display(), "Sibling gone before hold");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let held = file_ops::move_into(path, &self.conflicts_dir).await?;
        tracing::info!(path = %held.display(), "Holding file for conflict resolution");
        Ok(held)
    }

    /// Files currently held, with the systems each could belong to
    pub async fn list(&self, snapshot: &SystemSnapshot) -> ImportResult<Vec<HeldConflict>> {
        let mut read_dir = match tokio::fs::read_dir(&self.conflicts_dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ImportError::fs(&self.conflicts_dir, e)),
        };

        let mut held = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ImportError::fs(&self.conflicts_dir, e))?
        {
            let path = entry.path();
            if path.is_dir() || naming::is_hidden_or_marker(&path) {
                continue;
            }
            let candidate_systems = snapshot
                .systems_for_extension(&naming::extension_of(&path))
                .iter()
                .map(|s| s.id.clone())
                .collect();
            held.push(HeldConflict {
                file_name: naming::file_name_of(&path),
                path,
                candidate_systems,
            });
        }

        held.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(held)
    }

    /// Whether a file of this name sits in the holding area
    pub fn is_held(&self, file_name: &str) -> bool {
        self.locate(Path::new(file_name)).is_some()
    }

    /// Turn a user-supplied path (absolute, or a bare file name) into a held
    /// path; None when it does not name a file in the holding area
    pub fn locate(&self, path: &Path) -> Option<PathBuf> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.conflicts_dir.join(path)
        };
        if full.parent() != Some(self.conflicts_dir.as_path()) || !full.is_file() {
            return None;
        }
        Some(full)
    }

    /// Move a held file into `dest_dir`, with its disc-image siblings when
    /// `with_siblings` is set
    ///
    /// Returns the new path of `held` and of each sibling.
    pub async fn take(
        &self,
        held: &Path,
        dest_dir: &Path,
        with_siblings: bool,
    ) -> ImportResult<(PathBuf, Vec<PathBuf>)> {
        if with_siblings && naming::is_cd_file(held) {
            let grouped = cd_grouper::move_with_siblings(held, dest_dir).await?;
            return Ok((grouped.descriptor, grouped.siblings));
        }
        let moved = file_ops::move_into(held, dest_dir).await?;
        Ok((moved, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hold_moves_disc_siblings() {
        let dir = TempDir::new().unwrap();
        let imports = dir.path().join("Imports");
        std::fs::create_dir_all(&imports).unwrap();
        std::fs::write(imports.join("Game.cue"), b"cue").unwrap();
        std::fs::write(imports.join("Game (Track 1).bin"), b"t1").unwrap();
        std::fs::write(imports.join("Other.bin"), b"other").unwrap();

        let handler = ConflictHandler::new(dir.path().join("Conflicts"));
        let held = handler.hold(&imports.join("Game.cue")).await.unwrap();

        assert_eq!(held, dir.path().join("Conflicts/Game.cue"));
        assert!(dir.path().join("Conflicts/Game (Track 1).bin").exists());
        assert!(imports.join("Other.bin").exists());
        assert!(handler.is_held("Game (Track 1).bin"));
        assert!(!handler.is_held("Other.bin"));
    }

    #[tokio::test]
    async fn test_locate_rejects_outside_paths() {
        let dir = TempDir::new().unwrap();
        let conflicts = dir.path().join("Conflicts");
        std::fs::create_dir_all(&conflicts).unwrap();
        std::fs::write(conflicts.join("Game.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("Elsewhere.bin"), b"x").unwrap();
        let handler = ConflictHandler::new(&conflicts);

        assert_eq!(
            handler.locate(Path::new("Game.bin")),
            Some(conflicts.join("Game.bin"))
        );
        assert_eq!(handler.locate(&dir.path().join("Elsewhere.bin")), None);
        assert_eq!(handler.locate(Path::new("Missing.bin")), None);
        assert_eq!(handler.locate(Path::new("../Elsewhere.bin")), None);
    }
}
