//! Multi-file disc images
//!
//! A cue sheet (or other descriptor) travels with every file next to it whose
//! stripped name starts the same way: `Game.cue` takes `Game (Track 1).bin`
//! and `Game (Track 2).bin` along. Playlists are attached to the catalog
//! entry they belong to.

use crate::db::{CatalogStore, PathPredicate};
use crate::error::{ImportError, ImportResult};
use crate::models::{CatalogEntry, SystemSnapshot};
use crate::naming;
use crate::services::file_ops;
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of moving a descriptor together with its siblings
#[derive(Debug, Clone)]
pub struct GroupedMove {
    pub descriptor: PathBuf,
    pub siblings: Vec<PathBuf>,
}

/// Files next to `primary` that belong to the same disc image
///
/// Only disc-image extensions are considered. `__MACOSX` folders found on
/// the way are deleted.
pub fn find_siblings(primary: &Path) -> std::io::Result<Vec<PathBuf>> {
    let Some(dir) = primary.parent() else {
        return Ok(Vec::new());
    };
    let stripped = naming::stripped_stem(primary);

    let mut siblings = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path == primary {
            continue;
        }
        if naming::file_name_of(&path) == "__MACOSX" {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(path = %path.display(), "Failed to delete __MACOSX folder: {}", e);
            }
            continue;
        }
        if path.is_dir()
            || naming::is_hidden_or_marker(&path)
            || naming::is_archive(&path)
            || !naming::is_cd_file(&path)
        {
            continue;
        }
        if naming::matches_stripped(&naming::stem_of(&path), &stripped) {
            siblings.push(path);
        }
    }

    siblings.sort();
    Ok(siblings)
}

/// Move a descriptor and its siblings into `dest_dir`
///
/// Cue references whose case differs from the moved files are corrected.
pub async fn move_with_siblings(descriptor: &Path, dest_dir: &Path) -> ImportResult<GroupedMove> {
    let siblings = find_siblings(descriptor).map_err(|e| ImportError::fs(descriptor, e))?;

    let mut moved_siblings = Vec::with_capacity(siblings.len());
    for sibling in &siblings {
        moved_siblings.push(file_ops::move_into(sibling, dest_dir).await?);
    }
    let moved_descriptor = file_ops::move_into(descriptor, dest_dir).await?;

    if !moved_siblings.is_empty() {
        tracing::debug!(
            descriptor = %moved_descriptor.display(),
            siblings = moved_siblings.len(),
            "Moved disc image files"
        );
    }

    if naming::extension_of(&moved_descriptor) == "cue" {
        let names: Vec<String> = moved_siblings.iter().map(|p| naming::file_name_of(p)).collect();
        let cue = moved_descriptor.clone();
        tokio::task::spawn_blocking(move || repair_cue_case(&cue, &names))
            .await?
            .map_err(|e| ImportError::fs(&moved_descriptor, e))?;
    }

    Ok(GroupedMove {
        descriptor: moved_descriptor,
        siblings: moved_siblings,
    })
}

/// Rewrite references in a cue sheet to match the case of `file_names`
///
/// Returns whether the file was changed.
pub fn repair_cue_case(cue_path: &Path, file_names: &[String]) -> std::io::Result<bool> {
    let original = std::fs::read_to_string(cue_path)?;
    let mut text = original.clone();

    for name in file_names {
        let pattern = Regex::new(&format!("(?i){}", regex::escape(name)))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        text = pattern.replace_all(&text, NoExpand(name)).into_owned();
    }

    if text == original {
        return Ok(false);
    }
    std::fs::write(cue_path, text)?;
    tracing::info!(cue = %cue_path.display(), "Corrected file name case in cue sheet");
    Ok(true)
}

/// Attach a playlist to an existing disc-based catalog entry
///
/// The entry is found by the playlist's stripped name, or else by the
/// stripped first line of its contents. On a match the playlist is moved to
/// the entry's storage directory as `<entry base name>.<ext>` and recorded as
/// a related file. Returns the updated entry, or None when nothing matched.
pub async fn attach_playlist(
    playlist: &Path,
    catalog: &Arc<dyn CatalogStore>,
    snapshot: &SystemSnapshot,
) -> ImportResult<Option<CatalogEntry>> {
    let disc_systems: Vec<String> = snapshot
        .systems()
        .into_iter()
        .filter(|s| s.uses_disc_images)
        .map(|s| s.id.clone())
        .collect();
    if disc_systems.is_empty() {
        return Ok(None);
    }

    let stripped = naming::stripped_stem(playlist);
    let mut hits = catalog
        .find(&disc_systems, &PathPredicate::FileNameContains(stripped))
        .await?;

    if hits.is_empty() {
        let contents = tokio::fs::read_to_string(playlist)
            .await
            .map_err(|e| ImportError::fs(playlist, e))?;
        if let Some(first_line) = contents.lines().map(str::trim).find(|l| !l.is_empty()) {
            let first_stripped = naming::stripped_stem(Path::new(first_line));
            hits = catalog
                .find(&disc_systems, &PathPredicate::FileNameContains(first_stripped))
                .await?;
        }
    }

    let Some(entry) = hits.into_iter().next() else {
        return Ok(None);
    };
    let Some(dest_dir) = snapshot.storage_dir(&entry.system_id) else {
        return Ok(None);
    };

    let file_name = format!("{}.{}", entry.base_name(), naming::extension_of(playlist));
    let dest = dest_dir.join(&file_name);
    file_ops::move_to(playlist, &dest).await?;

    let relative = naming::relative_rom_path(&entry.system_id, &file_name);
    let updated = catalog
        .update(
            &entry.content_hash,
            Box::new(move |e| {
                e.add_related_file(relative);
            }),
        )
        .await?;

    tracing::info!(
        playlist = %playlist.display(),
        entry = %updated.relative_path,
        "Attached playlist to existing entry"
    );
    Ok(Some(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_siblings() {
        let dir = TempDir::new().unwrap();
        for name in [
            "Game.cue",
            "Game (Track 1).bin",
            "Game (Track 2).bin",
            "Game.png",
            "Other (Track 1).bin",
            "Game.zip",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("__MACOSX")).unwrap();

        let siblings = find_siblings(&dir.path().join("Game.cue")).unwrap();

        let names: Vec<_> = siblings.iter().map(|p| naming::file_name_of(p)).collect();
        assert_eq!(names, vec!["Game (Track 1).bin", "Game (Track 2).bin"]);
        assert!(!dir.path().join("__MACOSX").exists());
    }

    #[test]
    fn test_repair_cue_case() {
        let dir = TempDir::new().unwrap();
        let cue = dir.path().join("Game.cue");
        std::fs::write(
            &cue,
            "FILE \"game (track 1).BIN\" BINARY\n  TRACK 01 MODE1/2352\n",
        )
        .unwrap();

        let changed = repair_cue_case(&cue, &["Game (Track 1).bin".to_string()]).unwrap();

        assert!(changed);
        let text = std::fs::read_to_string(&cue).unwrap();
        assert!(text.contains("FILE \"Game (Track 1).bin\" BINARY"));
        assert!(!repair_cue_case(&cue, &["Game (Track 1).bin".to_string()]).unwrap());
    }

    #[tokio::test]
    async fn test_move_with_siblings() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(
            src.path().join("Game.cue"),
            "FILE \"GAME (TRACK 1).BIN\" BINARY\n",
        )
        .unwrap();
        std::fs::write(src.path().join("Game (Track 1).bin"), b"t1").unwrap();
        std::fs::write(src.path().join("Game (Track 2).bin"), b"t2").unwrap();

        let grouped = move_with_siblings(&src.path().join("Game.cue"), dest.path())
            .await
            .unwrap();

        assert_eq!(grouped.siblings.len(), 2);
        assert!(dest.path().join("Game.cue").exists());
        assert!(dest.path().join("Game (Track 2).bin").exists());
        assert_eq!(std::fs::read_dir(src.path()).unwrap().count(), 0);
        let cue = std::fs::read_to_string(dest.path().join("Game.cue")).unwrap();
        assert!(cue.contains("Game (Track 1).bin"));
    }
}
