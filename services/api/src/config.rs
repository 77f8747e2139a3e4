//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use recording_core::{FrameSettings, RecorderSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: Option<String>,
    pub recordings_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub camera_device: String,
    pub camera_input_format: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_rate: f64,
    pub frame_overlay: bool,
    pub stop_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:5000".parse::<SocketAddr>())?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", Ok(5))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN").ok();

        // --- Load Recording Settings ---
        let recordings_dir = std::env::var("RECORDINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./recordings"));
        let ffmpeg_path = std::env::var("FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        let camera_device =
            std::env::var("CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_string());
        let camera_input_format =
            std::env::var("CAMERA_INPUT_FORMAT").unwrap_or_else(|_| "v4l2".to_string());

        let defaults = FrameSettings::default();
        let frame_width = parse_var("FRAME_WIDTH", Ok(defaults.width))?;
        let frame_height = parse_var("FRAME_HEIGHT", Ok(defaults.height))?;
        let frame_rate = check_frame_rate(parse_var("FRAME_RATE", Ok(defaults.frame_rate))?)?;
        let frame_overlay = parse_var("FRAME_OVERLAY", Ok(true))?;

        let stop_timeout = Duration::from_secs(parse_var("STOP_TIMEOUT_SECONDS", Ok(5))?);

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            cors_origin,
            recordings_dir,
            ffmpeg_path,
            camera_device,
            camera_input_format,
            frame_width,
            frame_height,
            frame_rate,
            frame_overlay,
            stop_timeout,
        })
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            width: self.frame_width,
            height: self.frame_height,
            frame_rate: self.frame_rate,
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            output_dir: self.recordings_dir.clone(),
            frame: self.frame_settings(),
        }
    }
}

/// A frame rate must be a finite, positive number of frames per second.
fn check_frame_rate(frame_rate: f64) -> Result<f64, ConfigError> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(ConfigError::InvalidValue(
            "FRAME_RATE".to_string(),
            format!("{} is not a positive, finite frame rate", frame_rate),
        ));
    }
    Ok(frame_rate)
}

/// Reads `name` and parses it, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: Result<T, T::Err>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>(),
        Err(_) => default,
    };
    parsed.map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_the_default_when_unset() {
        let value: u32 = parse_var("RECORDING_TEST_UNSET_VARIABLE", Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn frame_rate_must_be_finite_and_positive() {
        assert_eq!(check_frame_rate(29.97).unwrap(), 29.97);
        for bad in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                check_frame_rate(bad),
                Err(ConfigError::InvalidValue(name, _)) if name == "FRAME_RATE"
            ));
        }
        // "NaN" and "inf" are what the environment actually hands us.
        assert!(check_frame_rate("NaN".parse().unwrap()).is_err());
        assert!(check_frame_rate("inf".parse().unwrap()).is_err());
    }

    #[test]
    fn parse_var_reports_the_variable_name_on_bad_input() {
        std::env::set_var("RECORDING_TEST_BAD_NUMBER", "fifteen");
        let err = parse_var::<u64>("RECORDING_TEST_BAD_NUMBER", Ok(5)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "RECORDING_TEST_BAD_NUMBER"));
    }
}
