//! Error types.
//!
//! Each component has its own error enum; [`Error`] unifies them for the
//! view-state holders and maps every failure onto an [`ErrorKind`].

use std::path::PathBuf;

use reqwest::StatusCode;

/// Coarse failure category, used to decide how a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    LocationUnavailable,
    NetworkTransport,
    NetworkProtocol,
    StorageWrite,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permissions not granted.")]
    PermissionDenied,
    #[error("Last known location is null, consider requesting a fresh update.")]
    NoCachedFix,
    #[error("Failed to get a fresh location update.")]
    NoFixObtained,
    #[error("Location service error: {0}")]
    Platform(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("HTTP Error: {status} - {body}")]
    Http { status: StatusCode, body: String },
    #[error("Network Error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to write image {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to create media directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Failed to read font {path}: {source}")]
    ReadFont {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid font file {0}")]
    InvalidFont(PathBuf),
}

/// Any failure surfaced to a screen.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Location permissions not granted.")]
    PermissionDenied,

    #[error(
        "Could not get current location. Please enable location services or grant permissions."
    )]
    LocationUnavailable,

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("No weather data available to save with image.")]
    NoWeather,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PermissionDenied => ErrorKind::PermissionDenied,
            Error::LocationUnavailable => ErrorKind::LocationUnavailable,
            Error::Weather(WeatherError::Transport(_)) => ErrorKind::NetworkTransport,
            Error::Weather(WeatherError::Http { .. }) => ErrorKind::NetworkProtocol,
            Error::Weather(WeatherError::Unexpected(_)) => ErrorKind::Unexpected,
            Error::Store(_) | Error::Media(_) => ErrorKind::StorageWrite,
            Error::NoWeather | Error::Task(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<LocationError> for Error {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => Error::PermissionDenied,
            _ => Error::LocationUnavailable,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_errors_collapse_to_two_kinds() {
        assert_eq!(
            Error::from(LocationError::PermissionDenied).kind(),
            ErrorKind::PermissionDenied
        );
        for err in [
            LocationError::NoCachedFix,
            LocationError::NoFixObtained,
            LocationError::Platform("gps off".into()),
        ] {
            assert_eq!(Error::from(err).kind(), ErrorKind::LocationUnavailable);
        }
    }

    #[test]
    fn http_failure_is_protocol_kind_and_keeps_status() {
        let err = Error::from(WeatherError::Http {
            status: StatusCode::UNAUTHORIZED,
            body: "{\"cod\":401}".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NetworkProtocol);
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn storage_failures_are_storage_kind() {
        let err = Error::from(StoreError::Poisoned);
        assert_eq!(err.kind(), ErrorKind::StorageWrite);

        let err = Error::from(MediaError::Write {
            path: PathBuf::from("/tmp/x.jpg"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(err.kind(), ErrorKind::StorageWrite);
    }

    #[test]
    fn no_weather_message() {
        assert_eq!(
            Error::NoWeather.to_string(),
            "No weather data available to save with image."
        );
    }
}
