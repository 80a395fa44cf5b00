use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::watch;

use super::{Dispatch, OpGate};
use crate::location::{FixOrigin, LocationHelper};
use crate::repository::{ImageRepository, WeatherRepository};
use crate::{CapturedImageRecord, Error, TemperatureUnit, WeatherReading};

/// A successful reading as the capture screen shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherDisplay {
    /// Canonical (Celsius) reading.
    pub reading: WeatherReading,
    pub unit: TemperatureUnit,
    pub origin: FixOrigin,
}

impl WeatherDisplay {
    pub fn temperature(&self) -> f64 {
        self.reading.temperature_in(self.unit)
    }

    /// e.g. `25.0°C, clear sky`
    pub fn text(&self) -> String {
        self.reading.summary(self.unit)
    }

    pub fn details(&self) -> String {
        self.reading.details()
    }

    pub fn location_is_stale(&self) -> bool {
        self.origin == FixOrigin::LastKnown
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum WeatherState {
    #[default]
    Idle,
    Loading,
    Success(WeatherDisplay),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved(CapturedImageRecord),
    Error(String),
}

/// State holder for the capture screen.
pub struct CaptureViewModel {
    location: LocationHelper,
    weather: WeatherRepository,
    images: ImageRepository,
    fix_interval: Duration,
    weather_state: watch::Sender<WeatherState>,
    unit: watch::Sender<TemperatureUnit>,
    save_state: watch::Sender<SaveState>,
    last_fetched: Mutex<Option<(WeatherReading, FixOrigin)>>,
    fetch_gate: OpGate,
    save_gate: OpGate,
}

impl std::fmt::Debug for CaptureViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureViewModel")
            .field("weather_state", &*self.weather_state.borrow())
            .field("unit", &*self.unit.borrow())
            .field("save_state", &*self.save_state.borrow())
            .finish_non_exhaustive()
    }
}

impl CaptureViewModel {
    pub fn new(
        location: LocationHelper,
        weather: WeatherRepository,
        images: ImageRepository,
        fix_interval: Duration,
    ) -> Self {
        Self {
            location,
            weather,
            images,
            fix_interval,
            weather_state: watch::Sender::new(WeatherState::Idle),
            unit: watch::Sender::new(TemperatureUnit::Celsius),
            save_state: watch::Sender::new(SaveState::Idle),
            last_fetched: Mutex::new(None),
            fetch_gate: OpGate::default(),
            save_gate: OpGate::default(),
        }
    }

    pub fn weather_state(&self) -> watch::Receiver<WeatherState> {
        self.weather_state.subscribe()
    }

    pub fn unit(&self) -> watch::Receiver<TemperatureUnit> {
        self.unit.subscribe()
    }

    pub fn save_state(&self) -> watch::Receiver<SaveState> {
        self.save_state.subscribe()
    }

    pub fn current_weather_state(&self) -> WeatherState {
        self.weather_state.borrow().clone()
    }

    pub fn current_unit(&self) -> TemperatureUnit {
        *self.unit.borrow()
    }

    pub fn current_save_state(&self) -> SaveState {
        self.save_state.borrow().clone()
    }

    /// Locate, then fetch the weather for that position.
    pub async fn fetch_weather(&self) -> Dispatch {
        let Some(_guard) = self.fetch_gate.try_begin() else {
            tracing::debug!("weather fetch already in flight");
            return Dispatch::Rejected;
        };

        self.weather_state.send_replace(WeatherState::Loading);

        match self.load_weather().await {
            Ok((reading, origin)) => {
                *self.last_fetched.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some((reading.clone(), origin));
                self.show(reading, origin);
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), "weather fetch failed: {e}");
                self.weather_state.send_replace(WeatherState::Error(e.to_string()));
            }
        }

        Dispatch::Completed
    }

    async fn load_weather(&self) -> Result<(WeatherReading, FixOrigin), Error> {
        if !self.location.has_permission() {
            return Err(Error::PermissionDenied);
        }

        let fix = self.location.locate(self.fix_interval).await?;
        let reading = self.weather.current_weather(fix.coordinate).await?;
        tracing::info!(coordinate = %fix.coordinate, city = %reading.city_name, "fetched weather");
        Ok((reading, fix.origin))
    }

    /// Switch between Celsius and Fahrenheit. Never hits the network.
    pub fn toggle_unit(&self) {
        self.unit.send_modify(|unit| *unit = unit.toggled());

        let showing_success = matches!(*self.weather_state.borrow(), WeatherState::Success(_));
        if showing_success {
            let last = self
                .last_fetched
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some((reading, origin)) = last {
                self.show(reading, origin);
            }
        }
    }

    fn show(&self, reading: WeatherReading, origin: FixOrigin) {
        let unit = *self.unit.borrow();
        self.weather_state
            .send_replace(WeatherState::Success(WeatherDisplay {
                reading,
                unit,
                origin,
            }));
    }

    /// Overlay the last fetched weather onto `photo` and save it.
    pub async fn save_image(&self, photo: DynamicImage) -> Dispatch {
        let Some(_guard) = self.save_gate.try_begin() else {
            tracing::debug!("image save already in flight");
            return Dispatch::Rejected;
        };

        let last = self
            .last_fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some((reading, _)) = last else {
            self.save_state
                .send_replace(SaveState::Error(Error::NoWeather.to_string()));
            return Dispatch::Completed;
        };

        self.save_state.send_replace(SaveState::Saving);
        let unit = *self.unit.borrow();

        match self.images.save_captured_image(photo, &reading, unit).await {
            Ok(record) => {
                tracing::info!(id = record.id, path = %record.image_path, "image saved");
                self.save_state.send_replace(SaveState::Saved(record));
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), "image save failed: {e}");
                self.save_state.send_replace(SaveState::Error(e.to_string()));
            }
        }

        Dispatch::Completed
    }

    /// Acknowledge a weather error.
    pub fn clear_weather_error(&self) {
        self.weather_state.send_if_modified(|state| {
            if matches!(state, WeatherState::Error(_)) {
                *state = WeatherState::Idle;
                true
            } else {
                false
            }
        });
    }

    pub fn reset_save_state(&self) {
        self.save_state.send_replace(SaveState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BlockTextRenderer, MockLocationSource, MockWeatherProvider};
    use crate::media::MediaStore;
    use crate::overlay::{Compositor, IconSet};
    use crate::store::ImageStore;
    use crate::GeoCoordinate;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn tanta() -> WeatherReading {
        WeatherReading {
            temperature_c: 25.0,
            humidity_pct: 40,
            wind_speed_mps: 3.2,
            description: "clear sky".into(),
            icon_code: "01d".into(),
            city_name: "Tanta".into(),
        }
    }

    struct Fixture {
        vm: CaptureViewModel,
        location: Arc<MockLocationSource>,
        provider: Arc<MockWeatherProvider>,
        store: Arc<ImageStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture(provider: MockWeatherProvider) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let location = Arc::new(MockLocationSource::new());
        location.respond_immediately(Some(GeoCoordinate::new(30.80, 31.00)));
        let provider = Arc::new(provider);
        let store = Arc::new(ImageStore::open_in_memory().unwrap());

        let images = ImageRepository::new(
            Arc::clone(&store),
            MediaStore::new(dir.path(), 90),
            Arc::new(Compositor::new(Box::new(BlockTextRenderer))),
            IconSet::default(),
        );
        let vm = CaptureViewModel::new(
            LocationHelper::new(location.clone()),
            WeatherRepository::new(provider.clone()),
            images,
            Duration::from_secs(10),
        );

        Fixture {
            vm,
            location,
            provider,
            store,
            _dir: dir,
        }
    }

    fn photo() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255])))
    }

    fn success_text(vm: &CaptureViewModel) -> String {
        match vm.current_weather_state() {
            WeatherState::Success(display) => display.text(),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn starts_idle_in_celsius() {
        let f = fixture(MockWeatherProvider::returning(tanta()));
        assert_eq!(f.vm.current_weather_state(), WeatherState::Idle);
        assert_eq!(f.vm.current_save_state(), SaveState::Idle);
        assert_eq!(f.vm.current_unit(), TemperatureUnit::Celsius);
    }

    #[tokio::test]
    async fn fetch_shows_celsius_then_fahrenheit_after_toggle() {
        let f = fixture(MockWeatherProvider::returning(tanta()));

        assert_eq!(f.vm.fetch_weather().await, Dispatch::Completed);
        assert_eq!(success_text(&f.vm), "25.0°C, clear sky");

        let requests = f.provider.requests();
        assert_eq!(requests.len(), 1);

        f.vm.toggle_unit();
        assert_eq!(success_text(&f.vm), "77.0°F, clear sky");
        // toggling never refetches
        assert_eq!(f.provider.requests().len(), 1);

        f.vm.toggle_unit();
        assert_eq!(success_text(&f.vm), "25.0°C, clear sky");
    }

    #[tokio::test]
    async fn missing_permission_is_an_error_state() {
        let f = fixture(MockWeatherProvider::returning(tanta()));
        f.location.set_permission(false);

        f.vm.fetch_weather().await;
        assert_eq!(
            f.vm.current_weather_state(),
            WeatherState::Error("Location permissions not granted.".into())
        );
        assert!(f.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn stale_location_is_flagged() {
        let f = fixture(MockWeatherProvider::returning(tanta()));
        f.location.respond_immediately(None);
        f.location.set_last_location(Some(GeoCoordinate::new(30.0, 31.0)));

        f.vm.fetch_weather().await;
        match f.vm.current_weather_state() {
            WeatherState::Success(display) => assert!(display.location_is_stale()),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_error_until_acknowledged() {
        let f = fixture(MockWeatherProvider::failing(401));

        f.vm.fetch_weather().await;
        let WeatherState::Error(message) = f.vm.current_weather_state() else {
            panic!("expected Error");
        };
        assert!(message.contains("401"));

        // toggling does not dismiss the error
        f.vm.toggle_unit();
        assert!(matches!(f.vm.current_weather_state(), WeatherState::Error(_)));

        f.vm.clear_weather_error();
        assert_eq!(f.vm.current_weather_state(), WeatherState::Idle);
    }

    #[tokio::test]
    async fn concurrent_fetch_is_rejected() {
        let f = fixture(
            MockWeatherProvider::returning(tanta()).with_delay(Duration::from_millis(50)),
        );

        let (first, second) = tokio::join!(f.vm.fetch_weather(), f.vm.fetch_weather());
        assert_eq!(first, Dispatch::Completed);
        assert_eq!(second, Dispatch::Rejected);
        assert_eq!(f.provider.requests().len(), 1);

        // gate released afterwards
        assert_eq!(f.vm.fetch_weather().await, Dispatch::Completed);
    }

    #[tokio::test]
    async fn save_without_weather_is_an_error() {
        let f = fixture(MockWeatherProvider::returning(tanta()));

        f.vm.save_image(photo()).await;
        assert_eq!(
            f.vm.current_save_state(),
            SaveState::Error("No weather data available to save with image.".into())
        );

        f.vm.reset_save_state();
        assert_eq!(f.vm.current_save_state(), SaveState::Idle);
    }

    #[tokio::test]
    async fn saved_record_is_canonical_even_in_fahrenheit() {
        let f = fixture(MockWeatherProvider::returning(tanta()));
        f.vm.fetch_weather().await;
        f.vm.toggle_unit();

        f.vm.save_image(photo()).await;
        let SaveState::Saved(record) = f.vm.current_save_state() else {
            panic!("expected Saved");
        };
        assert_eq!(record.reading(), tanta());

        let stored = f.store.all_by_recency().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].temperature_c, 25.0);
    }

    #[tokio::test]
    async fn concurrent_save_is_rejected() {
        let f = fixture(MockWeatherProvider::returning(tanta()));
        f.vm.fetch_weather().await;

        let (first, second) = tokio::join!(f.vm.save_image(photo()), f.vm.save_image(photo()));
        assert_eq!(first, Dispatch::Completed);
        assert_eq!(second, Dispatch::Rejected);
        assert_eq!(f.store.all_by_recency().unwrap().len(), 1);
    }
}
