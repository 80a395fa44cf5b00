//! Write-once JPEG storage for composited photos.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use image::RgbaImage;
use image::codecs::jpeg::JpegEncoder;

use crate::MediaError;

pub const IMAGE_FILE_NAME_PREFIX: &str = "WeatherImage_";
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A file written by the media store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub path: PathBuf,
    pub display_name: String,
    pub mime_type: &'static str,
}

impl MediaRef {
    pub fn uri(&self) -> String {
        self.path.display().to_string()
    }
}

/// `WeatherImage_yyyyMMdd_HHmmss`, in local time like the camera roll.
pub fn display_name_for(captured_at: DateTime<Utc>) -> String {
    format!(
        "{IMAGE_FILE_NAME_PREFIX}{}",
        captured_at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    quality: u8,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            root: root.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode `image` as JPEG under `<root>/<display_name>.jpg`.
    ///
    /// Existing files are never overwritten: a taken name gets a `_1`, `_2`, ...
    /// suffix. A partially written file is removed before the error is returned.
    pub fn write_jpeg(&self, image: &RgbaImage, display_name: &str) -> Result<MediaRef, MediaError> {
        fs::create_dir_all(&self.root).map_err(|source| MediaError::CreateDirectory {
            path: self.root.clone(),
            source,
        })?;

        let (path, file) = self.create_unique(display_name)?;

        if let Err(e) = self.encode_into(file, image, &path) {
            if let Err(cleanup) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), "failed to remove partial image: {cleanup}");
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), "saved image");
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(MediaRef {
            path,
            display_name,
            mime_type: IMAGE_MIME_TYPE,
        })
    }

    fn create_unique(&self, display_name: &str) -> Result<(PathBuf, File), MediaError> {
        let mut last_err = None;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{display_name}.jpg")
            } else {
                format!("{display_name}_{attempt}.jpg")
            };
            let path = self.root.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    last_err = Some((path, e));
                }
                Err(source) => return Err(MediaError::Write { path, source }),
            }
        }

        let (path, source) = last_err.unwrap_or_else(|| {
            (
                self.root.join(display_name),
                std::io::Error::from(ErrorKind::AlreadyExists),
            )
        });
        Err(MediaError::Write { path, source })
    }

    fn encode_into(&self, file: File, image: &RgbaImage, path: &Path) -> Result<(), MediaError> {
        // JPEG has no alpha channel
        let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();

        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(&rgb)
            .map_err(|source| MediaError::Encode {
                path: path.to_path_buf(),
                source,
            })?;

        writer.flush().map_err(|source| MediaError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
