//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{WlgrabError, WlgrabResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture defaults.
    pub capture: CaptureDefaults,

    /// Output file defaults.
    pub output: OutputDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default capture parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Ask sources to paint cursors into their buffers.
    pub with_cursor: bool,

    /// Fixed output scale. `None` uses the greatest output scale.
    pub scale: Option<f64>,
}

/// Default encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputDefaults {
    /// File type name: "png", "ppm" or "jpeg".
    pub format: String,

    /// PNG compression level (0-9).
    pub png_level: u8,

    /// JPEG quality (0-100).
    pub jpeg_quality: u8,

    /// Directory for generated file names. Overrides the environment lookup.
    pub directory: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "wlgrab=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            format: "png".to_string(),
            png_level: 6,
            jpeg_quality: 80,
            directory: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => match config.validate() {
                        Ok(()) => return config,
                        Err(e) => {
                            tracing::warn!("Ignoring invalid config at {:?}: {}", config_path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Reject values the encoders and compositor cannot honour.
    pub fn validate(&self) -> WlgrabResult<()> {
        if let Some(scale) = self.capture.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(WlgrabError::config(format!(
                    "scale must be a positive number, got {scale}"
                )));
            }
        }
        if self.output.png_level > 9 {
            return Err(WlgrabError::config(
                "compression level valid values are between 0-9",
            ));
        }
        if self.output.jpeg_quality > 100 {
            return Err(WlgrabError::config(
                "quality valid values are between 0-100",
            ));
        }
        match self.output.format.as_str() {
            "png" | "ppm" | "jpeg" => Ok(()),
            other => Err(WlgrabError::config(format!("invalid filetype '{other}'"))),
        }
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wlgrab")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output.png_level, 6);
        assert_eq!(config.output.jpeg_quality, 80);
        assert!(!config.capture.with_cursor);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "output": { "format": "jpeg" } }"#).unwrap();
        assert_eq!(config.output.format, "jpeg");
        assert_eq!(config.output.jpeg_quality, 80);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = AppConfig::default();
        config.output.png_level = 10;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.scale = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.output.format = "bmp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_lives_under_the_user_config_dir() {
        let path = config_file_path();
        assert!(path.ends_with("wlgrab/config.json"));
        if let Some(base) = dirs::config_dir() {
            assert!(path.starts_with(base));
        }
    }
}
