//! Weather overlay compositing.

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::OverlayError;

const PADDING: u32 = 30;
const ICON_SIZE: u32 = 100;
const SHADOW_OFFSET: i32 = 2;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 160]);
pub const DEFAULT_TEXT_SIZE: f32 = 60.0;

/// Measures and draws a single line of text.
pub trait TextRenderer: Send + Sync {
    /// Width and height in pixels of `text` as it would be drawn.
    fn measure(&self, text: &str) -> (u32, u32);

    /// Draw with the top-left corner of the text box at `(x, y)`.
    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, color: Rgba<u8>);
}

/// Renders an outline font loaded from disk.
#[derive(Clone)]
pub struct GlyphRenderer {
    font: FontArc,
    scale: PxScale,
}

impl std::fmt::Debug for GlyphRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphRenderer")
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

impl GlyphRenderer {
    pub fn new(font: FontArc, size: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(size),
        }
    }

    pub fn from_file(path: &Path, size: f32) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path).map_err(|source| OverlayError::ReadFont {
            path: path.to_path_buf(),
            source,
        })?;
        let font =
            FontArc::try_from_vec(bytes).map_err(|_| OverlayError::InvalidFont(path.to_path_buf()))?;
        Ok(Self::new(font, size))
    }
}

impl TextRenderer for GlyphRenderer {
    fn measure(&self, text: &str) -> (u32, u32) {
        imageproc::drawing::text_size(self.scale, &self.font, text)
    }

    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, color: Rgba<u8>) {
        imageproc::drawing::draw_text_mut(canvas, color, x, y, self.scale, &self.font, text);
    }
}

/// Draws an icon and a shadowed label into the top-left corner of a photo.
pub struct Compositor {
    renderer: Box<dyn TextRenderer>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor").finish_non_exhaustive()
    }
}

impl Compositor {
    pub fn new(renderer: Box<dyn TextRenderer>) -> Self {
        Self { renderer }
    }

    /// Returns a new image; `photo` is left as is. A missing icon only drops
    /// the icon, the label is still drawn.
    pub fn overlay(&self, photo: &DynamicImage, text: &str, icon: Option<&RgbaImage>) -> RgbaImage {
        let mut canvas = photo.to_rgba8();

        let icon = icon.map(|icon| imageops::resize(icon, ICON_SIZE, ICON_SIZE, FilterType::Lanczos3));
        let (icon_w, icon_h) = icon.as_ref().map_or((0, 0), |i| (i.width(), i.height()));

        if let Some(icon) = &icon {
            imageops::overlay(&mut canvas, icon, i64::from(PADDING), i64::from(PADDING));
        }

        let (_, text_h) = self.renderer.measure(text);
        let text_x = match icon {
            Some(_) => PADDING + icon_w + PADDING,
            None => PADDING,
        } as i32;
        // vertically centred on the icon
        let text_y = (PADDING + icon_h / 2) as i32 - (text_h / 2) as i32;
        let text_y = text_y.max(0);

        self.renderer.draw(
            &mut canvas,
            text,
            text_x + SHADOW_OFFSET,
            text_y + SHADOW_OFFSET,
            SHADOW_COLOR,
        );
        self.renderer.draw(&mut canvas, text, text_x, text_y, TEXT_COLOR);

        canvas
    }
}

/// Asset name for an OpenWeatherMap icon code.
pub fn icon_asset_name(icon_code: &str) -> &'static str {
    match icon_code {
        "01d" | "01n" => "clear_sky",
        "02d" | "02n" => "few_clouds",
        "03d" | "03n" => "scattered_clouds",
        "04d" | "04n" => "broken_clouds",
        "09d" | "09n" => "shower_rain",
        "10d" | "10n" => "rain",
        "11d" | "11n" => "thunderstorm",
        "13d" | "13n" => "snow",
        "50d" | "50n" => "mist",
        _ => "unknown",
    }
}

/// Weather icons stored as `<dir>/<asset>.png`.
#[derive(Debug, Clone, Default)]
pub struct IconSet {
    dir: Option<PathBuf>,
}

impl IconSet {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, icon_code: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.png", icon_asset_name(icon_code))))
    }

    pub fn load(&self, icon_code: &str) -> Option<RgbaImage> {
        let path = self.path_for(icon_code)?;
        match image::open(&path) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                tracing::warn!(path = %path.display(), "weather icon not loaded: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::BlockTextRenderer;

    fn photo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 80, 160, 255])))
    }

    fn compositor() -> Compositor {
        Compositor::new(Box::new(BlockTextRenderer))
    }

    #[test]
    fn icon_codes_map_to_assets() {
        assert_eq!(icon_asset_name("01d"), "clear_sky");
        assert_eq!(icon_asset_name("01n"), "clear_sky");
        assert_eq!(icon_asset_name("04n"), "broken_clouds");
        assert_eq!(icon_asset_name("50d"), "mist");
        assert_eq!(icon_asset_name(""), "unknown");
        assert_eq!(icon_asset_name("99x"), "unknown");
    }

    #[test]
    fn overlay_keeps_dimensions_and_source() {
        let src = photo(400, 300);
        let out = compositor().overlay(&src, "25.0°C, clear sky", None);

        assert_eq!(out.dimensions(), (400, 300));
        // source untouched
        assert_eq!(src.to_rgba8().get_pixel(PADDING, PADDING), &Rgba([10, 80, 160, 255]));
    }

    #[test]
    fn text_without_icon_starts_at_padding() {
        let out = compositor().overlay(&photo(400, 300), "abc", None);
        let (px, py) = (PADDING, PADDING.saturating_sub(5));
        assert_eq!(out.get_pixel(px, py), &TEXT_COLOR);
        // far corner untouched
        assert_eq!(out.get_pixel(399, 299), &Rgba([10, 80, 160, 255]));
    }

    #[test]
    fn icon_is_scaled_and_text_moves_right() {
        let icon = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let out = compositor().overlay(&photo(400, 300), "abc", Some(&icon));

        // icon occupies PADDING..PADDING+ICON_SIZE
        assert_eq!(out.get_pixel(PADDING + 5, PADDING + 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(
            out.get_pixel(PADDING + ICON_SIZE - 1, PADDING + ICON_SIZE - 1),
            &Rgba([255, 0, 0, 255])
        );

        // label starts after icon + padding, centred on the icon
        let text_x = PADDING + ICON_SIZE + PADDING;
        let text_y = PADDING + ICON_SIZE / 2 - 5;
        assert_eq!(out.get_pixel(text_x, text_y), &TEXT_COLOR);
    }

    #[test]
    fn shadow_is_offset_from_label() {
        let out = compositor().overlay(&photo(400, 300), "a", None);
        // one 6px glyph drawn at x = PADDING; the shadow pokes out to the right
        let shadow_x = PADDING + 6 + 1;
        let y = PADDING.saturating_sub(5) + 3;
        assert_eq!(out.get_pixel(shadow_x, y), &SHADOW_COLOR);
    }

    #[test]
    fn icon_set_without_dir_loads_nothing() {
        let icons = IconSet::default();
        assert!(icons.path_for("01d").is_none());
        assert!(icons.load("01d").is_none());
    }

    #[test]
    fn icon_set_loads_png_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]))
            .save(dir.path().join("clear_sky.png"))
            .unwrap();

        let icons = IconSet::new(Some(dir.path().to_path_buf()));
        let icon = icons.load("01d").expect("icon present");
        assert_eq!(icon.dimensions(), (4, 4));

        // missing asset is not an error
        assert!(icons.load("13d").is_none());
    }

    #[test]
    fn missing_font_file_is_reported() {
        let err = GlyphRenderer::from_file(Path::new("/nonexistent/font.ttf"), 60.0).unwrap_err();
        assert!(matches!(err, OverlayError::ReadFont { .. }));
    }

    #[test]
    fn garbage_font_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        let err = GlyphRenderer::from_file(&path, 60.0).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidFont(_)));
    }
}
