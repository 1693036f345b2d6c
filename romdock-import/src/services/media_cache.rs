//! Artwork byte cache
//!
//! Keys are MD5 hex digests of the stored bytes; each key maps to one file
//! `<key>.jpg` in the cache directory.

use async_trait::async_trait;
use std::path::PathBuf;

/// Put/get/exists storage for artwork bytes
#[async_trait]
pub trait MediaCache: Send + Sync {
    async fn exists(&self, key: &str) -> bool;

    /// Store bytes under `key`, returning where they landed
    async fn put(&self, bytes: Vec<u8>, key: &str) -> std::io::Result<PathBuf>;

    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>>;
}

/// Cache backed by a directory
pub struct FileMediaCache {
    dir: PathBuf,
}

impl FileMediaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        // Keys come from hashes; anything else could escape the directory
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.dir.join(format!("{}.jpg", key)))
    }
}

fn invalid_key(key: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("invalid media cache key {:?}", key),
    )
}

#[async_trait]
impl MediaCache for FileMediaCache {
    async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    async fn put(&self, bytes: Vec<u8>, key: &str) -> std::io::Result<PathBuf> {
        let path = self.path_for(key).ok_or_else(|| invalid_key(key))?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a partial file
        let tmp = self.dir.join(format!(".{}.tmp", key));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.path_for(key).ok_or_else(|| invalid_key(key))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
