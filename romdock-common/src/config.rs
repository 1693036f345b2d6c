//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "ROMDOCK_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "ROMDOCK_CONFIG";

/// Contents of `config.toml`
///
/// Every section is optional; missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding imports, conflicts, storage and caches
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub import: ImportSettings,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[import]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportSettings {
    /// Delay between two size readings of a freshly arrived file
    pub stability_interval_ms: u64,
    /// Number of files processed in parallel
    pub work_concurrency: usize,
    /// Longest edge of cached artwork, in pixels
    pub artwork_max_resolution: u32,
    /// JPEG quality (1-100) of cached artwork
    pub artwork_jpeg_quality: u8,
    /// Reference metadata database; defaults to `<root>/openvgdb.sqlite`
    pub reference_database: Option<PathBuf>,
    /// Address the HTTP control surface binds to
    pub bind_address: String,
    /// Timeout applied to artwork downloads
    pub http_timeout_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            stability_interval_ms: 2000,
            work_concurrency: 3,
            artwork_max_resolution: 640,
            artwork_jpeg_quality: 85,
            reference_database: None,
            bind_address: "127.0.0.1:5730".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl ImportSettings {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.work_concurrency == 0 {
            return Err(Error::Config("import.work_concurrency must be at least 1".to_string()));
        }
        if self.stability_interval_ms == 0 {
            return Err(Error::Config(
                "import.stability_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.artwork_jpeg_quality) {
            return Err(Error::Config(format!(
                "import.artwork_jpeg_quality must be 1-100, got {}",
                self.artwork_jpeg_quality
            )));
        }
        if self.artwork_max_resolution == 0 {
            return Err(Error::Config(
                "import.artwork_max_resolution must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a TOML config file
///
/// A missing file yields the defaults; a file that exists but does not parse
/// is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(TomlConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.import.validate()?;
    Ok(config)
}

/// Config file location: explicit argument, then `ROMDOCK_CONFIG`, then the
/// platform config directory (`~/.config/romdock/config.toml` on Linux)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("romdock").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("romdock.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\romdock
        dirs::data_local_dir()
            .map(|d| d.join("romdock"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\romdock"))
    } else {
        // ~/.local/share/romdock, ~/Library/Application Support/romdock
        dirs::data_dir()
            .map(|d| d.join("romdock"))
            .unwrap_or_else(|| PathBuf::from("./romdock_data"))
    }
}
