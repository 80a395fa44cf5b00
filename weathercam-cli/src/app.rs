//! Builds the core services from the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use weathercam_core::config::LocationSourceKind;
use weathercam_core::location::{FixedLocationSource, IpLocationSource};
use weathercam_core::media::MediaStore;
use weathercam_core::overlay::{Compositor, DEFAULT_TEXT_SIZE, GlyphRenderer, IconSet};
use weathercam_core::provider::provider_from_config;
use weathercam_core::{
    CaptureViewModel, Config, GeoCoordinate, HistoryViewModel, ImageRepository, ImageStore,
    LocationHelper, LocationSource, WeatherProvider, WeatherRepository,
};

/// Fonts tried when `overlay.font_path` is unset.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// An explicit coordinate from the command line wins over the configured source.
pub fn location_helper(
    config: &Config,
    position: Option<GeoCoordinate>,
) -> anyhow::Result<LocationHelper> {
    let permitted = config.location.enabled;

    let source: Arc<dyn LocationSource> = match (position, config.location.source) {
        (Some(coord), _) => Arc::new(FixedLocationSource::new(coord).with_permission(permitted)),
        (None, LocationSourceKind::Fixed) => Arc::new(
            FixedLocationSource::new(config.location.coordinate()).with_permission(permitted),
        ),
        (None, LocationSourceKind::Ip) => Arc::new(
            IpLocationSource::new(Some(config.location.coordinate()))?
                .with_permission(permitted),
        ),
    };

    tracing::debug!(source = ?config.location.source, override_given = position.is_some(), "location source ready");
    Ok(LocationHelper::new(source))
}

pub fn weather_provider(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    Ok(Arc::from(provider_from_config(config)?))
}

fn font_path(config: &Config) -> anyhow::Result<PathBuf> {
    if let Some(path) = &config.overlay.font_path {
        return Ok(path.clone());
    }

    SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            anyhow!(
                "No overlay font found.\n\
                 Hint: run `weathercam configure` and point it at a TTF/OTF file."
            )
        })
}

fn image_repository(config: &Config) -> anyhow::Result<ImageRepository> {
    let store = ImageStore::open(config.database_path()?).context("Failed to open image history")?;
    let media = MediaStore::new(config.media_dir()?, config.overlay.jpeg_quality);

    let font = font_path(config)?;
    let renderer = GlyphRenderer::from_file(&font, DEFAULT_TEXT_SIZE)?;
    tracing::debug!(font = %font.display(), "overlay font loaded");

    Ok(ImageRepository::new(
        Arc::new(store),
        media,
        Arc::new(Compositor::new(Box::new(renderer))),
        IconSet::new(config.overlay.icon_dir.clone()),
    ))
}

pub fn capture_screen(
    config: &Config,
    position: Option<GeoCoordinate>,
) -> anyhow::Result<CaptureViewModel> {
    Ok(CaptureViewModel::new(
        location_helper(config, position)?,
        WeatherRepository::new(weather_provider(config)?),
        image_repository(config)?,
        config.location.fix_interval(),
    ))
}

/// The history screen never renders overlays, so it does not need a font.
pub fn history_screen(config: &Config) -> anyhow::Result<HistoryViewModel> {
    let store = ImageStore::open(config.database_path()?).context("Failed to open image history")?;
    let media = MediaStore::new(config.media_dir()?, config.overlay.jpeg_quality);
    let images = ImageRepository::new(
        Arc::new(store),
        media,
        Arc::new(Compositor::new(Box::new(NoLabel))),
        IconSet::default(),
    );
    Ok(HistoryViewModel::new(images))
}

/// Renderer for read-only screens.
struct NoLabel;

impl weathercam_core::overlay::TextRenderer for NoLabel {
    fn measure(&self, _text: &str) -> (u32, u32) {
        (0, 0)
    }

    fn draw(&self, _: &mut image::RgbaImage, _: &str, _: i32, _: i32, _: image::Rgba<u8>) {}
}
