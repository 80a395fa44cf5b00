//! Repositories sitting between the view-state holders and the data sources.

use std::sync::Arc;

use chrono::Utc;
use image::DynamicImage;
use tokio::sync::watch;
use tokio::task;

use crate::media::{MediaStore, display_name_for};
use crate::overlay::{Compositor, IconSet};
use crate::provider::{UnitSystem, WeatherProvider};
use crate::store::ImageStore;
use crate::{
    CapturedImageRecord, Error, GeoCoordinate, NewCapturedImage, TemperatureUnit, WeatherError,
    WeatherReading,
};

#[derive(Debug, Clone)]
pub struct WeatherRepository {
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherRepository {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }

    /// Always fetched in metric, so the reading is canonical Celsius.
    pub async fn current_weather(&self, coord: GeoCoordinate) -> Result<WeatherReading, WeatherError> {
        self.provider.fetch(coord, UnitSystem::Metric).await
    }
}

/// Saves composited photos and their weather metadata.
#[derive(Debug, Clone)]
pub struct ImageRepository {
    store: Arc<ImageStore>,
    media: MediaStore,
    compositor: Arc<Compositor>,
    icons: IconSet,
}

impl ImageRepository {
    pub fn new(
        store: Arc<ImageStore>,
        media: MediaStore,
        compositor: Arc<Compositor>,
        icons: IconSet,
    ) -> Self {
        Self {
            store,
            media,
            compositor,
            icons,
        }
    }

    /// Overlay the reading onto `photo`, write the JPEG, then record it.
    ///
    /// The overlay label uses `display_unit`; the stored record always keeps the
    /// canonical Celsius reading.
    pub async fn save_captured_image(
        &self,
        photo: DynamicImage,
        reading: &WeatherReading,
        display_unit: TemperatureUnit,
    ) -> Result<CapturedImageRecord, Error> {
        let text = reading.summary(display_unit);
        let captured_at = Utc::now();
        let display_name = display_name_for(captured_at);

        let media = self.media.clone();
        let compositor = Arc::clone(&self.compositor);
        let icons = self.icons.clone();
        let icon_code = reading.icon_code.clone();

        let written = task::spawn_blocking(move || {
            let icon = icons.load(&icon_code);
            let composited = compositor.overlay(&photo, &text, icon.as_ref());
            media.write_jpeg(&composited, &display_name)
        })
        .await??;

        let new = NewCapturedImage {
            image_path: written.uri(),
            reading: reading.clone(),
            timestamp_ms: captured_at.timestamp_millis(),
        };

        let store = Arc::clone(&self.store);
        let record = task::spawn_blocking(move || {
            let id = store.insert(&new)?;
            Ok::<_, Error>(new.into_record(id))
        })
        .await?;

        if let Err(e) = &record {
            tracing::warn!(path = %written.path.display(), "image written but not recorded: {e}");
        }
        record
    }

    pub fn images(&self) -> watch::Receiver<Vec<CapturedImageRecord>> {
        self.store.subscribe()
    }

    pub async fn all_images(&self) -> Result<Vec<CapturedImageRecord>, Error> {
        let store = Arc::clone(&self.store);
        Ok(task::spawn_blocking(move || store.all_by_recency()).await??)
    }

    /// Removes the metadata row only; the image file stays on disk.
    pub async fn delete_image(&self, id: i64) -> Result<bool, Error> {
        let store = Arc::clone(&self.store);
        Ok(task::spawn_blocking(move || store.delete(id)).await??)
    }
}
