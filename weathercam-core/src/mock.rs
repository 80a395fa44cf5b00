//! Test doubles for the platform and network seams.
//!
//! [`MockLocationSource`] records every registration and lets a test decide
//! when (and whether) a fix arrives. [`MockWeatherProvider`] returns canned
//! readings or failures and counts requests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::location::{LocationCallback, LocationSource, SubscriptionId, UpdateRequest};
use crate::overlay::TextRenderer;
use crate::provider::{UnitSystem, WeatherProvider};
use crate::{GeoCoordinate, LocationError, WeatherError, WeatherReading};

/// A location source driven by the test.
///
/// By default registrations stay pending until [`MockLocationSource::emit`].
/// With [`MockLocationSource::respond_immediately`] each registration is
/// answered synchronously inside `request_updates`.
pub struct MockLocationSource {
    permitted: AtomicBool,
    last: Mutex<Option<GeoCoordinate>>,
    immediate: Mutex<Option<Option<GeoCoordinate>>>,
    active: Mutex<BTreeMap<SubscriptionId, LocationCallback>>,
    requests: Mutex<Vec<UpdateRequest>>,
    removed: Mutex<Vec<SubscriptionId>>,
    next_id: AtomicU64,
    invocations: AtomicUsize,
}

impl Default for MockLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLocationSource {
    pub fn new() -> Self {
        Self {
            permitted: AtomicBool::new(true),
            last: Mutex::new(None),
            immediate: Mutex::new(None),
            active: Mutex::new(BTreeMap::new()),
            requests: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn set_permission(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn set_last_location(&self, fix: Option<GeoCoordinate>) {
        *lock(&self.last) = fix;
    }

    pub fn respond_immediately(&self, fix: Option<GeoCoordinate>) {
        *lock(&self.immediate) = Some(fix);
    }

    /// Deliver `fix` to every active registration. Returns how many callbacks ran.
    pub fn emit(&self, fix: Option<GeoCoordinate>) -> usize {
        let mut active = lock(&self.active);
        for callback in active.values_mut() {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            callback(fix);
        }
        active.len()
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn total_registrations(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<UpdateRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn removed_ids(&self) -> Vec<SubscriptionId> {
        lock(&self.removed).clone()
    }

    pub fn callback_invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for MockLocationSource {
    fn has_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn last_location(&self) -> Result<Option<GeoCoordinate>, LocationError> {
        Ok(*lock(&self.last))
    }

    fn request_updates(
        &self,
        request: UpdateRequest,
        mut callback: LocationCallback,
    ) -> Result<SubscriptionId, LocationError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);

        let immediate = *lock(&self.immediate);
        if let Some(fix) = immediate {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            callback(fix);
        }

        lock(&self.active).insert(id, callback);
        Ok(id)
    }

    fn remove_updates(&self, id: SubscriptionId) {
        if lock(&self.active).remove(&id).is_some() {
            lock(&self.removed).push(id);
        }
    }
}

/// Canned weather provider.
#[derive(Debug, Default)]
pub struct MockWeatherProvider {
    reading: Mutex<Option<WeatherReading>>,
    fail_with_status: Mutex<Option<u16>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(GeoCoordinate, UnitSystem)>>,
}

impl MockWeatherProvider {
    pub fn returning(reading: WeatherReading) -> Self {
        let provider = Self::default();
        *lock(&provider.reading) = Some(reading);
        provider
    }

    /// Every fetch fails with an HTTP error of the given status.
    pub fn failing(status: u16) -> Self {
        let provider = Self::default();
        *lock(&provider.fail_with_status) = Some(status);
        provider
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<(GeoCoordinate, UnitSystem)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    async fn fetch(
        &self,
        coord: GeoCoordinate,
        units: UnitSystem,
    ) -> Result<WeatherReading, WeatherError> {
        lock(&self.requests).push((coord, units));

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let status = *lock(&self.fail_with_status);
        if let Some(status) = status {
            return Err(WeatherError::Http {
                status: reqwest::StatusCode::from_u16(status)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                body: "mock failure".to_string(),
            });
        }

        lock(&self.reading)
            .clone()
            .ok_or_else(|| WeatherError::Unexpected("no canned reading".to_string()))
    }
}

/// Draws each character as a solid 6x10 block. Lets overlay tests run
/// without a font file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTextRenderer;

impl BlockTextRenderer {
    const GLYPH_W: u32 = 6;
    const GLYPH_H: u32 = 10;
}

impl TextRenderer for BlockTextRenderer {
    fn measure(&self, text: &str) -> (u32, u32) {
        let chars = text.chars().count() as u32;
        (chars * Self::GLYPH_W, if chars == 0 { 0 } else { Self::GLYPH_H })
    }

    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, color: Rgba<u8>) {
        let (w, h) = self.measure(text);
        for dy in 0..h as i32 {
            for dx in 0..w as i32 {
                let (px, py) = (x + dx, y + dy);
                if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                    canvas.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
