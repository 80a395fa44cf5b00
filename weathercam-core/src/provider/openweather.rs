use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{GeoCoordinate, WeatherError, WeatherReading};

use super::{UnitSystem, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> Result<Self, WeatherError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the client somewhere other than the public API (tests, proxies).
    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self, WeatherError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(WeatherError::Transport)?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn fetch_current(
        &self,
        coord: GeoCoordinate,
        units: UnitSystem,
    ) -> Result<WeatherReading, WeatherError> {
        let url = format!("{}/weather", self.base_url);
        tracing::debug!(%coord, %units, "requesting current weather");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", coord.latitude.to_string()),
                ("lon", coord.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", units.as_str().to_string()),
            ])
            .send()
            .await
            .map_err(WeatherError::Transport)?;

        let status = res.status();
        let body = res.text().await.map_err(WeatherError::Transport)?;

        if !status.is_success() {
            return Err(WeatherError::Http {
                status,
                body: truncate_body(&body),
            });
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body).map_err(|e| {
            WeatherError::Unexpected(format!("Failed to parse OpenWeather current JSON: {e}"))
        })?;

        Ok(parsed.into_reading())
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OwCoord {
    lon: f64,
    lat: f64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OwWeather {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    main: Option<String>,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OwCurrentResponse {
    #[serde(default)]
    coord: Option<OwCoord>,
    #[serde(default)]
    weather: Vec<OwWeather>,
    main: OwMain,
    wind: OwWind,
    name: String,
    #[serde(default)]
    dt: Option<i64>,
}

impl OwCurrentResponse {
    fn into_reading(self) -> WeatherReading {
        let (description, icon_code) = self
            .weather
            .into_iter()
            .next()
            .map(|w| (w.description, w.icon))
            .unwrap_or_else(|| ("N/A".to_string(), String::new()));

        WeatherReading {
            temperature_c: self.main.temp,
            humidity_pct: self.main.humidity.min(100),
            wind_speed_mps: self.wind.speed.max(0.0),
            description,
            icon_code,
            city_name: self.name,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch(
        &self,
        coord: GeoCoordinate,
        units: UnitSystem,
    ) -> Result<WeatherReading, WeatherError> {
        self.fetch_current(coord, units).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
