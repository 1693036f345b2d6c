//! Import candidates and content hashing
//!
//! A candidate is one path plus its MD5, computed on first use and then
//! fixed. The hash survives moves: `relocate` keeps the computed value.

use crate::error::{ImportError, ImportResult};
use crate::models::SystemSnapshot;
use crate::naming;
use md5::{Digest, Md5};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

/// A file waiting to be classified
#[derive(Debug)]
pub struct ImportCandidate {
    path: PathBuf,
    header_size: u64,
    hash: OnceCell<String>,
}

impl ImportCandidate {
    /// Candidate whose hash skips `header_size` leading bytes
    pub fn new(path: impl Into<PathBuf>, header_size: u64) -> Self {
        Self {
            path: path.into(),
            header_size,
            hash: OnceCell::new(),
        }
    }

    /// Candidate whose header size is taken from the systems claiming its
    /// extension; when they disagree nothing is skipped
    pub fn for_snapshot(path: impl Into<PathBuf>, snapshot: &SystemSnapshot) -> Self {
        let path = path.into();
        let systems = snapshot.systems_for_extension(&naming::extension_of(&path));
        let header_size = match systems.split_first() {
            Some((first, rest)) if rest.iter().all(|s| s.header_size == first.header_size) => {
                first.header_size
            }
            _ => 0,
        };
        Self::new(path, header_size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> String {
        naming::extension_of(&self.path)
    }

    pub fn file_name(&self) -> String {
        naming::file_name_of(&self.path)
    }

    pub fn stripped_stem(&self) -> String {
        naming::stripped_stem(&self.path)
    }

    /// MD5 of the file contents, lower-case hex
    pub async fn content_hash(&self) -> ImportResult<&str> {
        let path = self.path.clone();
        let header_size = self.header_size;
        let hash = self
            .hash
            .get_or_try_init(|| async move { md5_file(&path, header_size).await })
            .await?;
        Ok(hash.as_str())
    }

    /// The hash, if it has been computed already
    pub fn cached_hash(&self) -> Option<&str> {
        self.hash.get().map(String::as_str)
    }

    /// Same candidate at a new location
    pub fn relocate(self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self
        }
    }
}

/// Hash a file on the blocking pool
pub async fn md5_file(path: &Path, header_size: u64) -> ImportResult<String> {
    let owned = path.to_path_buf();
    tracing::debug!(path = %owned.display(), header_size, "Calculating MD5");

    tokio::task::spawn_blocking(move || {
        md5_file_blocking(&owned, header_size).map_err(|e| ImportError::fs(&owned, e))
    })
    .await?
}

/// Hash a file in 1MB chunks, skipping `header_size` bytes when the file is
/// longer than that
pub fn md5_file_blocking(path: &Path, header_size: u64) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if header_size > 0 && len > header_size {
        file.seek(SeekFrom::Start(header_size))?;
    }

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of an in-memory buffer, lower-case hex
pub fn md5_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hash_is_memoized_across_relocation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("game.gb");
        std::fs::write(&path, b"hello").unwrap();

        let candidate = ImportCandidate::new(&path, 0);
        let hash = candidate.content_hash().await.unwrap().to_string();
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");

        // Rewriting the file does not change the memoized value
        std::fs::write(&path, b"changed").unwrap();
        let moved = candidate.relocate(dir.path().join("elsewhere.gb"));
        assert_eq!(moved.cached_hash(), Some(hash.as_str()));
        assert_eq!(moved.content_hash().await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_header_is_skipped() {
        let dir = TempDir::new().unwrap();
        let with_header = dir.path().join("a.nes");
        let without_header = dir.path().join("b.nes");
        let mut bytes = b"NES\x1a".to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(b"program data");
        std::fs::write(&with_header, &bytes).unwrap();
        std::fs::write(&without_header, b"program data").unwrap();

        let a = md5_file(&with_header, 16).await.unwrap();
        let b = md5_file(&without_header, 0).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_file_hashed_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.nes");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            md5_file_blocking(&path, 16).unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_filesystem_error() {
        let candidate = ImportCandidate::new("/definitely/not/here.nes", 0);
        assert!(matches!(
            candidate.content_hash().await,
            Err(ImportError::Filesystem { .. })
        ));
    }

    #[test]
    fn test_md5_bytes() {
        assert_eq!(md5_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }
}
