//! Core library for `weathercam`.
//!
//! Take a photo, stamp the current weather for your location onto it and keep
//! a local history of the results. This crate defines:
//! - Configuration handling
//! - The location helper and its platform seam
//! - The OpenWeatherMap client
//! - Overlay compositing and write-once JPEG storage
//! - The SQLite history store
//! - State holders for the capture and history screens
//!
//! It is used by `weathercam-cli`, but the state holders can back any front end.

pub mod config;
pub mod error;
pub mod location;
pub mod media;
pub mod mock;
pub mod model;
pub mod overlay;
pub mod provider;
pub mod repository;
pub mod store;
pub mod viewmodel;

pub use config::Config;
pub use error::{
    Error, ErrorKind, LocationError, MediaError, OverlayError, Result, StoreError, WeatherError,
};
pub use location::{Fix, FixOrigin, LocationHelper, LocationSource};
pub use model::{
    CapturedImageRecord, GeoCoordinate, NewCapturedImage, TemperatureUnit, WeatherReading,
};
pub use provider::{UnitSystem, WeatherProvider};
pub use repository::{ImageRepository, WeatherRepository};
pub use store::ImageStore;
pub use viewmodel::{
    CaptureViewModel, Dispatch, HistoryState, HistoryViewModel, SaveState, WeatherState,
};
