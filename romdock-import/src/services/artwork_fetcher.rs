//! Cover art download and caching
//!
//! Artwork is decoded, scaled to fit the configured bound, re-encoded as
//! JPEG and stored under the MD5 of the scaled bytes. Failures never block
//! an import; the entry simply has no artwork.

use crate::db::{CatalogStore, PathPredicate};
use crate::error::{ImportError, ImportResult};
use crate::models::{CatalogEntry, SystemSnapshot};
use crate::naming;
use crate::services::candidate::md5_bytes;
use crate::services::media_cache::MediaCache;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use romdock_common::events::{EventBus, RomdockEvent};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const LEGACY_BOX_ART_PREFIX: &str = "gamefaqs1.cbsistatic.com/box/";
const CURRENT_BOX_ART_PREFIX: &str = "gamefaqs.gamespot.com/a/box/";

/// Artwork errors
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scaling task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Scaling and encoding parameters
#[derive(Debug, Clone, Copy)]
pub struct ArtworkSettings {
    /// Longest edge in pixels
    pub max_resolution: u32,
    pub jpeg_quality: u8,
}

pub struct ArtworkFetcher {
    http: reqwest::Client,
    catalog: Arc<dyn CatalogStore>,
    cache: Arc<dyn MediaCache>,
    event_bus: EventBus,
    settings: ArtworkSettings,
}

impl ArtworkFetcher {
    pub fn new(
        http: reqwest::Client,
        catalog: Arc<dyn CatalogStore>,
        cache: Arc<dyn MediaCache>,
        event_bus: EventBus,
        settings: ArtworkSettings,
    ) -> Self {
        Self {
            http,
            catalog,
            cache,
            event_bus,
            settings,
        }
    }

    /// Download the entry's artwork unless it is already cached
    ///
    /// Returns the updated entry, or None when there was nothing to do.
    pub async fn fetch(&self, entry: &CatalogEntry) -> ImportResult<Option<CatalogEntry>> {
        let Some(url) = entry.artwork_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
        else {
            return Ok(None);
        };
        if let Some(key) = entry.artwork_ref.as_deref() {
            if self.cache.exists(key).await {
                tracing::debug!(entry = %entry.relative_path, "Artwork already cached");
                return Ok(None);
            }
        }

        let url = normalize_artwork_url(url);
        let result = self.download_and_store(&url).await;
        self.event_bus.emit_lossy(RomdockEvent::ArtworkFinished {
            url: url.clone(),
            cached: result.is_ok(),
            timestamp: chrono::Utc::now(),
        });

        let key = result.map_err(|e| ImportError::ArtworkDownload {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let updated = self
            .catalog
            .update(
                &entry.content_hash,
                Box::new(move |e| e.artwork_ref = Some(key)),
            )
            .await?;
        tracing::info!(entry = %updated.relative_path, url = %url, "Artwork cached");
        Ok(Some(updated))
    }

    async fn download_and_store(&self, url: &str) -> Result<String, ArtworkError> {
        let response = self.http.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(ArtworkError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?.to_vec();
        self.store(bytes).await
    }

    /// Scale, key and cache raw image bytes; returns the cache key
    async fn store(&self, bytes: Vec<u8>) -> Result<String, ArtworkError> {
        let settings = self.settings;
        let scaled = tokio::task::spawn_blocking(move || {
            scale_artwork(&bytes, settings.max_resolution, settings.jpeg_quality)
        })
        .await??;

        let key = md5_bytes(&scaled);
        self.cache.put(scaled, &key).await?;
        Ok(key)
    }

    /// Attach an image dropped next to ROMs as an entry's custom artwork
    ///
    /// `Game.nes.png` goes to the entry stored as `<system>/Game.nes` for a
    /// system claiming `nes`. Without a ROM extension in the name, the single
    /// entry whose file name contains the stem is used. The image is deleted
    /// once cached. Returns None when no entry matched.
    pub async fn import_local_artwork(
        &self,
        image_path: &Path,
        snapshot: &SystemSnapshot,
    ) -> ImportResult<Option<CatalogEntry>> {
        let Some(entry) = self.find_artwork_target(image_path, snapshot).await? else {
            tracing::debug!(path = %image_path.display(), "No catalog entry for image");
            return Ok(None);
        };

        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| ImportError::fs(image_path, e))?;
        let key = self.store(bytes).await.map_err(|e| ImportError::ArtworkDownload {
            url: image_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let updated = self
            .catalog
            .update(
                &entry.content_hash,
                Box::new(move |e| e.custom_artwork_ref = Some(key)),
            )
            .await?;

        tokio::fs::remove_file(image_path)
            .await
            .map_err(|e| ImportError::fs(image_path, e))?;
        tracing::info!(
            path = %image_path.display(),
            entry = %updated.relative_path,
            "Custom artwork attached"
        );
        Ok(Some(updated))
    }

    async fn find_artwork_target(
        &self,
        image_path: &Path,
        snapshot: &SystemSnapshot,
    ) -> ImportResult<Option<CatalogEntry>> {
        let rom_name = naming::stem_of(image_path);
        let rom_ext = naming::extension_of(Path::new(&rom_name));

        for system in snapshot.systems_for_extension(&rom_ext) {
            let relative = naming::relative_rom_path(&system.id, &rom_name);
            let hits = self
                .catalog
                .find(
                    std::slice::from_ref(&system.id),
                    &PathPredicate::RelativePath(relative),
                )
                .await?;
            if let Some(hit) = hits.into_iter().next() {
                return Ok(Some(hit));
            }
        }

        let stem = naming::stem_of(Path::new(&rom_name));
        let all_ids: Vec<String> = snapshot.systems().iter().map(|s| s.id.clone()).collect();
        let mut hits = self
            .catalog
            .find(&all_ids, &PathPredicate::FileNameContains(stem))
            .await?;
        if hits.len() == 1 {
            return Ok(hits.pop());
        }
        Ok(None)
    }
}

/// Rewrite artwork hosts that moved
pub fn normalize_artwork_url(url: &str) -> String {
    url.replace(LEGACY_BOX_ART_PREFIX, CURRENT_BOX_ART_PREFIX)
}

/// Decode, shrink to fit `max_resolution` (aspect kept), encode as JPEG
pub fn scale_artwork(bytes: &[u8], max_resolution: u32, quality: u8) -> Result<Vec<u8>, ArtworkError> {
    let mut image = image::load_from_memory(bytes)?;
    if image.width() > max_resolution || image.height() > max_resolution {
        image = image.thumbnail(max_resolution, max_resolution);
    }

    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_normalize_artwork_url() {
        assert_eq!(
            normalize_artwork_url("https://gamefaqs1.cbsistatic.com/box/1/2/3/front.jpg"),
            "https://gamefaqs.gamespot.com/a/box/1/2/3/front.jpg"
        );
        assert_eq!(
            normalize_artwork_url("https://example.com/a.png"),
            "https://example.com/a.png"
        );
    }

    #[test]
    fn test_scale_artwork_bounds_longest_edge() {
        let scaled = scale_artwork(&png(1280, 640), 640, 85).unwrap();
        let decoded = image::load_from_memory(&scaled).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 320);
    }

    #[test]
    fn test_small_artwork_is_not_enlarged() {
        let scaled = scale_artwork(&png(100, 50), 640, 85).unwrap();
        let decoded = image::load_from_memory(&scaled).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_garbage_is_image_error() {
        assert!(matches!(
            scale_artwork(b"not an image", 640, 85),
            Err(ArtworkError::Image(_))
        ));
    }
}
