use serde::{Deserialize, Serialize};

/// A single resolved position. Never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// One fetched weather snapshot, always in canonical units
/// (Celsius, m/s). Display conversion happens via [`TemperatureUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub description: String,
    pub icon_code: String,
    pub city_name: String,
}

impl WeatherReading {
    /// Temperature converted for display. The reading itself is left untouched.
    pub fn temperature_in(&self, unit: TemperatureUnit) -> f64 {
        unit.value_from_celsius(self.temperature_c)
    }

    /// Label used both on screen and in the photo overlay, e.g. `25.0°C, clear sky`.
    pub fn summary(&self, unit: TemperatureUnit) -> String {
        format!(
            "{:.1}{}, {}",
            self.temperature_in(unit),
            unit.symbol(),
            self.description
        )
    }

    /// Secondary line shown under the temperature.
    pub fn details(&self) -> String {
        format!(
            "Humidity: {}%, Wind: {:.1} m/s",
            self.humidity_pct, self.wind_speed_mps
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TemperatureUnit::Celsius => TemperatureUnit::Fahrenheit,
            TemperatureUnit::Fahrenheit => TemperatureUnit::Celsius,
        }
    }

    pub fn value_from_celsius(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(celsius),
        }
    }

    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(value),
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Metadata row for a saved photo.
///
/// `image_path` points at the JPEG written by the media store; the record does
/// not own the file and deleting the record leaves the file in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImageRecord {
    pub id: i64,
    pub image_path: String,
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub description: String,
    pub icon_code: String,
    pub city_name: String,
    /// Capture time, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl CapturedImageRecord {
    pub fn reading(&self) -> WeatherReading {
        WeatherReading {
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            wind_speed_mps: self.wind_speed_mps,
            description: self.description.clone(),
            icon_code: self.icon_code.clone(),
            city_name: self.city_name.clone(),
        }
    }
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCapturedImage {
    pub image_path: String,
    pub reading: WeatherReading,
    pub timestamp_ms: i64,
}

impl NewCapturedImage {
    pub fn into_record(self, id: i64) -> CapturedImageRecord {
        CapturedImageRecord {
            id,
            image_path: self.image_path,
            temperature_c: self.reading.temperature_c,
            humidity_pct: self.reading.humidity_pct,
            wind_speed_mps: self.reading.wind_speed_mps,
            description: self.reading.description,
            icon_code: self.reading.icon_code,
            city_name: self.reading.city_name,
            timestamp_ms: self.timestamp_ms,
        }
    }
}
