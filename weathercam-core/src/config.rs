use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{GeoCoordinate, provider::openweather::DEFAULT_BASE_URL};

/// Tanta, Egypt.
pub const DEFAULT_LATITUDE: f64 = 30.7997;
pub const DEFAULT_LONGITUDE: f64 = 31.0003;
pub const DEFAULT_FIX_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Where a fresh fix comes from on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSourceKind {
    /// The configured coordinate.
    #[default]
    Fixed,
    /// IP geolocation, with the configured coordinate as the cached fix.
    Ip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Desktop stand-in for the platform location permission.
    pub enabled: bool,
    pub source: LocationSourceKind,
    pub latitude: f64,
    pub longitude: f64,
    /// Update interval hint passed to the source; not a timeout.
    pub fix_interval_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: LocationSourceKind::default(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            fix_interval_secs: DEFAULT_FIX_INTERVAL_SECS,
        }
    }
}

impl LocationConfig {
    pub fn coordinate(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.latitude, self.longitude)
    }

    pub fn fix_interval(&self) -> Duration {
        Duration::from_secs(self.fix_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub media_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TrueType/OpenType font used for the overlay label.
    pub font_path: Option<PathBuf>,
    /// Directory holding `<asset>.png` weather icons.
    pub icon_dir: Option<PathBuf>,
    pub jpeg_quality: u8,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            icon_dir: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
///
/// [location]
/// source = "ip"
///
/// [overlay]
/// font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub location: LocationConfig,
    pub storage: StorageConfig,
    pub overlay: OverlayConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weathercam", "weathercam")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Directory composited photos are written to.
    pub fn media_dir(&self) -> Result<PathBuf> {
        match &self.storage.media_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("Pictures")),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("weathercam.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_api_key() {
        let cfg = Config::default();
        assert!(cfg.api_key().is_none());
        assert!(!cfg.is_configured());
        assert_eq!(cfg.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.set_api_key("   ".into());
        assert!(!cfg.is_configured());

        cfg.set_api_key("OPEN_KEY".into());
        assert_eq!(cfg.api_key(), Some("OPEN_KEY"));
    }

    #[test]
    fn location_defaults_to_tanta_fixed_source() {
        let loc = LocationConfig::default();
        assert!(loc.enabled);
        assert_eq!(loc.source, LocationSourceKind::Fixed);
        assert_eq!(loc.coordinate(), GeoCoordinate::new(30.7997, 31.0003));
        assert_eq!(loc.fix_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            api_key = "KEY"

            [location]
            source = "ip"

            [overlay]
            icon_dir = "/opt/icons"
            "#,
        )
        .expect("config should parse");

        assert_eq!(cfg.api_key(), Some("KEY"));
        assert_eq!(cfg.location.source, LocationSourceKind::Ip);
        assert_eq!(cfg.location.latitude, DEFAULT_LATITUDE);
        assert_eq!(cfg.overlay.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(cfg.overlay.icon_dir, Some(PathBuf::from("/opt/icons")));
    }

    #[test]
    fn save_and_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.set_api_key("KEY".into());
        cfg.storage.media_dir = Some(dir.path().join("media"));
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_key(), Some("KEY"));
        assert_eq!(loaded.media_dir().unwrap(), dir.path().join("media"));
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(!cfg.is_configured());
    }
}
