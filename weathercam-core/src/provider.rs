use crate::{Config, GeoCoordinate, WeatherError, WeatherReading, provider::openweather::OpenWeatherClient};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Unit system the provider reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
            UnitSystem::Standard => "standard",
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current-conditions source. One call is one network round trip:
/// no retry, no backoff, no caching.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(
        &self,
        coord: GeoCoordinate,
        units: UnitSystem,
    ) -> Result<WeatherReading, WeatherError>;
}

/// Construct the OpenWeatherMap client from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeatherMap API key configured.\n\
             Hint: run `weathercam configure` and enter your API key."
        )
    })?;

    let client = OpenWeatherClient::with_base_url(api_key.to_owned(), config.base_url())?;
    Ok(Box::new(client))
}
