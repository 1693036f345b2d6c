//! Archive extraction for the drop folder
//!
//! Members are written next to the archive one at a time. Progress goes out
//! over a bounded channel; a slow or absent consumer never stalls extraction.
//! The archive is deleted only after every member was written.

use crate::naming;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

/// Extraction errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("7z error: {0}")]
    SevenZ(String),

    #[error("Unsupported archive type: {0}")]
    Unsupported(String),

    #[error("Extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One member written
#[derive(Debug, Clone)]
pub struct ExtractionProgress {
    pub archive: PathBuf,
    pub member: PathBuf,
    pub completed: usize,
    pub total: usize,
}

/// Extracts zip and 7z archives
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract into `dest` on the blocking pool, then delete the archive
    ///
    /// Returns the extracted file paths. On error the archive is kept and
    /// members already written stay where they are.
    pub async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        progress: Option<mpsc::Sender<ExtractionProgress>>,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        let archive_owned = archive.to_path_buf();
        let dest_owned = dest.to_path_buf();

        let extracted = tokio::task::spawn_blocking(move || {
            extract_blocking(&archive_owned, &dest_owned, progress.as_ref())
        })
        .await??;

        tokio::fs::remove_file(archive).await?;
        tracing::info!(
            archive = %archive.display(),
            members = extracted.len(),
            "Archive extracted and removed"
        );
        Ok(extracted)
    }
}

/// Extract without deleting the archive
pub fn extract_blocking(
    archive: &Path,
    dest: &Path,
    progress: Option<&mpsc::Sender<ExtractionProgress>>,
) -> Result<Vec<PathBuf>, ArchiveError> {
    std::fs::create_dir_all(dest)?;
    match naming::extension_of(archive).as_str() {
        "zip" => extract_zip(archive, dest, progress),
        "7z" => extract_7z(archive, dest, progress),
        other => Err(ArchiveError::Unsupported(other.to_string())),
    }
}

/// Members that must not be written: bookkeeping folders, hidden files,
/// absolute or parent-relative names
fn is_unwanted_member(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part == "__MACOSX" || part.starts_with('.')
        }
        Component::CurDir => false,
        _ => true,
    })
}

fn report(
    progress: Option<&mpsc::Sender<ExtractionProgress>>,
    archive: &Path,
    member: &Path,
    completed: usize,
    total: usize,
) {
    if let Some(tx) = progress {
        // A full channel drops the update rather than blocking extraction
        let _ = tx.try_send(ExtractionProgress {
            archive: archive.to_path_buf(),
            member: member.to_path_buf(),
            completed,
            total,
        });
    }
}

fn extract_zip(
    archive: &Path,
    dest: &Path,
    progress: Option<&mpsc::Sender<ExtractionProgress>>,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;

    // Progress counts only the members that get written
    let mut wanted = Vec::new();
    for i in 0..zip.len() {
        let member = zip.by_index_raw(i)?;
        if member.is_dir() {
            continue;
        }
        match member.enclosed_name().map(|p| p.to_path_buf()) {
            Some(relative) if !is_unwanted_member(&relative) => wanted.push((i, relative)),
            Some(_) => {}
            None => {
                tracing::warn!(archive = %archive.display(), name = member.name(), "Skipping unsafe member")
            }
        }
    }

    let total = wanted.len();
    let mut extracted = Vec::with_capacity(total);

    for (i, relative) in wanted {
        let mut member = zip.by_index(i)?;
        let out_path = dest.join(&relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        std::io::copy(&mut member, &mut out)?;
        extracted.push(out_path.clone());
        report(progress, archive, &out_path, extracted.len(), total);
    }

    Ok(extracted)
}

fn extract_7z(
    archive: &Path,
    dest: &Path,
    progress: Option<&mpsc::Sender<ExtractionProgress>>,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let total = sevenz_rust::SevenZReader::open(archive, sevenz_rust::Password::empty())
        .map_err(|e| ArchiveError::SevenZ(e.to_string()))?
        .archive()
        .files
        .iter()
        .filter(|f| !f.is_directory())
        .count();

    let mut extracted = Vec::new();
    let mut completed = 0;

    sevenz_rust::decompress_file_with_extract_fn(archive, dest, |entry, reader, dest_path| {
        let relative = PathBuf::from(entry.name());
        if entry.is_directory() || is_unwanted_member(&relative) {
            std::io::copy(reader, &mut std::io::sink())?;
            return Ok(true);
        }

        let written = sevenz_rust::default_entry_extract_fn(entry, reader, dest_path)?;
        completed += 1;
        extracted.push(dest_path.clone());
        report(progress, archive, dest_path, completed, total);
        Ok(written)
    })
    .map_err(|e| ArchiveError::SevenZ(e.to_string()))?;

    Ok(extracted)
}
