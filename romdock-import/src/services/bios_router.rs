//! System firmware routing
//!
//! A dropped file that is a known BIOS never enters the catalog. It goes to
//! `BIOS/<system id>/` under the name the system's emulators expect,
//! replacing whatever copy was there.

use crate::error::{ImportError, ImportResult};
use crate::models::{BiosMatch, SystemSnapshot};
use crate::naming;
use crate::services::{candidate, file_ops};
use std::path::{Path, PathBuf};

pub struct BiosRouter {
    bios_root: PathBuf,
}

impl BiosRouter {
    pub fn new(bios_root: impl Into<PathBuf>) -> Self {
        Self {
            bios_root: bios_root.into(),
        }
    }

    /// BIOS entry `path` is a copy of
    ///
    /// File name first. Otherwise the file is hashed, but only when its size
    /// is one a BIOS listed by MD5 has.
    pub async fn identify(
        &self,
        path: &Path,
        snapshot: &SystemSnapshot,
    ) -> ImportResult<Option<BiosMatch>> {
        if let Some(bios) = snapshot.bios_for_file_name(&naming::file_name_of(path)) {
            return Ok(Some(bios.clone()));
        }

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| ImportError::fs(path, e))?
            .len();
        if !snapshot.is_bios_size(size) {
            return Ok(None);
        }

        let md5 = candidate::md5_file(path, 0).await?;
        Ok(snapshot.bios_for_md5(&md5).cloned())
    }

    /// Move `path` into its system's BIOS directory under the expected name
    pub async fn install(&self, path: &Path, bios: &BiosMatch) -> ImportResult<PathBuf> {
        let dest = self.bios_dir(&bios.system.id).join(&bios.entry.file_name);
        if dest.exists() {
            tracing::info!(path = %dest.display(), "Replacing existing BIOS");
        }
        file_ops::move_to(path, &dest).await?;
        tracing::info!(
            source = %path.display(),
            system = %bios.system.id,
            bios = %bios.entry.file_name,
            "Installed BIOS"
        );
        Ok(dest)
    }

    pub fn bios_dir(&self, system_id: &str) -> PathBuf {
        self.bios_root.join(system_id)
    }
}
