use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use weathercam_core::{
    CapturedImageRecord, Config, Dispatch, GeoCoordinate, HistoryState, HistoryViewModel,
    SaveState, TemperatureUnit, WeatherRepository, WeatherState, config::LocationSourceKind,
};

use crate::app;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathercam", version, about = "Stamp the current weather onto your photos")]
pub struct Cli {
    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct Position {
    /// Latitude override; skips the location source.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude override; skips the location source.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

impl Position {
    pub fn coordinate(&self) -> Option<GeoCoordinate> {
        Some(GeoCoordinate::new(self.lat?, self.lon?))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the API key and overlay options interactively.
    Configure,

    /// Show the current weather for your location.
    Weather {
        #[command(flatten)]
        position: Position,

        /// Display temperatures in Fahrenheit.
        #[arg(long)]
        fahrenheit: bool,
    },

    /// Stamp the current weather onto a photo and save it to the history.
    Capture {
        /// Photo to annotate.
        photo: PathBuf,

        #[command(flatten)]
        position: Position,

        /// Use Fahrenheit in the overlay label (the record is always stored in Celsius).
        #[arg(long)]
        fahrenheit: bool,
    },

    /// List saved photos, most recent first.
    History,

    /// Delete a history entry. The image file is kept.
    Delete {
        id: i64,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Weather {
                position,
                fahrenheit,
            } => show_weather(position, fahrenheit).await,
            Command::Capture {
                photo,
                position,
                fahrenheit,
            } => capture(photo, position, fahrenheit).await,
            Command::History => history().await,
            Command::Delete { id } => delete(id).await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Text::new("OpenWeatherMap API key:")
        .with_default(config.api_key().unwrap_or_default())
        .with_help_message("https://home.openweathermap.org/api_keys")
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key.trim().to_string());

    let sources = vec!["fixed", "ip"];
    let source = inquire::Select::new("Location source:", sources)
        .with_help_message("fixed: configured coordinate, ip: IP geolocation")
        .prompt()
        .context("Failed to read location source")?;
    config.location.source = match source {
        "ip" => LocationSourceKind::Ip,
        _ => LocationSourceKind::Fixed,
    };

    let font = inquire::Text::new("Overlay font (TTF/OTF path, empty for system default):")
        .with_default(
            &config
                .overlay
                .font_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )
        .prompt()
        .context("Failed to read font path")?;
    config.overlay.font_path = (!font.trim().is_empty()).then(|| PathBuf::from(font.trim()));

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show_weather(position: Position, fahrenheit: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let location = app::location_helper(&config, position.coordinate())?;
    let weather = WeatherRepository::new(app::weather_provider(&config)?);

    let fix = location.locate(config.location.fix_interval()).await?;
    let reading = weather.current_weather(fix.coordinate).await?;

    let unit = if fahrenheit {
        TemperatureUnit::Fahrenheit
    } else {
        TemperatureUnit::Celsius
    };

    println!("{}", reading.city_name);
    println!("  {}", reading.summary(unit));
    println!("  {}", reading.details());
    if fix.is_stale() {
        println!("  (using last known location, might be outdated)");
    }
    Ok(())
}

async fn capture(photo: PathBuf, position: Position, fahrenheit: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let image = image::open(&photo)
        .with_context(|| format!("Failed to open photo: {}", photo.display()))?;

    let screen = app::capture_screen(&config, position.coordinate())?;

    screen.fetch_weather().await;
    if fahrenheit {
        screen.toggle_unit();
    }

    match screen.current_weather_state() {
        WeatherState::Success(display) => {
            println!("{}: {}", display.reading.city_name, display.text());
            if display.location_is_stale() {
                println!("  (using last known location, might be outdated)");
            }
        }
        WeatherState::Error(message) => return Err(anyhow!(message)),
        other => return Err(anyhow!("weather not available ({other:?})")),
    }

    if screen.save_image(image).await == Dispatch::Rejected {
        return Err(anyhow!("a save is already in progress"));
    }

    match screen.current_save_state() {
        SaveState::Saved(record) => {
            println!("Saved #{} -> {}", record.id, record.image_path);
            Ok(())
        }
        SaveState::Error(message) => Err(anyhow!(message)),
        other => Err(anyhow!("unexpected save state {other:?}")),
    }
}

async fn loaded(screen: &HistoryViewModel) -> anyhow::Result<Vec<CapturedImageRecord>> {
    let mut state = screen.state();
    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| matches!(s, HistoryState::Loaded(_) | HistoryState::Error(_))),
    )
    .await
    .context("Timed out loading history")?
    .context("History screen closed")?
    .clone();

    match settled {
        HistoryState::Loaded(list) => Ok(list),
        HistoryState::Error(message) => Err(anyhow!(message)),
        _ => Ok(Vec::new()),
    }
}

async fn history() -> anyhow::Result<()> {
    let config = Config::load()?;
    let screen = app::history_screen(&config)?;
    let records = loaded(&screen).await?;

    if records.is_empty() {
        println!("No photos yet. Try `weathercam capture <photo>`.");
        return Ok(());
    }

    println!("Weather Photo History");
    for record in &records {
        print_record(record);
    }
    screen.close();
    Ok(())
}

async fn delete(id: i64) -> anyhow::Result<()> {
    let config = Config::load()?;
    let screen = app::history_screen(&config)?;
    let before = loaded(&screen).await?;

    let Some(record) = before.iter().find(|r| r.id == id) else {
        return Err(anyhow!("No history entry with id {id}"));
    };
    let kept_file = record.image_path.clone();

    screen.delete_image(id).await;
    if let Some(message) = screen.current_error_message() {
        screen.clear_error_message();
        return Err(anyhow!(message));
    }

    println!("Deleted #{id}. Image file kept at {kept_file}");
    screen.close();
    Ok(())
}

fn print_record(record: &CapturedImageRecord) {
    let when = DateTime::from_timestamp_millis(record.timestamp_ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| record.timestamp_ms.to_string());

    println!(
        "#{:<4} {}  {}  {}",
        record.id,
        when,
        record.city_name,
        record.reading().summary(TemperatureUnit::Celsius)
    );
    println!("      {}", record.image_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn capture_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "weathercam", "capture", "photo.jpg", "--lat", "-33.9", "--lon", "18.4", "--fahrenheit",
        ])
        .unwrap();

        match cli.command {
            Command::Capture {
                photo,
                position,
                fahrenheit,
            } => {
                assert_eq!(photo, PathBuf::from("photo.jpg"));
                assert_eq!(position.coordinate(), Some(GeoCoordinate::new(-33.9, 18.4)));
                assert!(fahrenheit);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lat_without_lon_is_rejected() {
        assert!(Cli::try_parse_from(["weathercam", "weather", "--lat", "1.0"]).is_err());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["weathercam", "-v", "-q", "history"]).is_err());
    }
}
