//! Session configuration, loadable from JSON.

use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::graph::builder::{clamp_master_volume, DEFAULT_MASTER_VOLUME};

pub const DEFAULT_MAX_CAPTURE_SECONDS: f64 = 30.0;
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read settings: {}", err),
            Self::Parse(err) => write!(f, "failed to parse settings: {}", err),
            Self::Invalid(reason) => write!(f, "invalid settings: {}", reason),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<io::Error> for SettingsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Tunables for an [`crate::session::EffectSession`]. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Output gain in `[0, 1]`.
    pub master_volume: f32,
    pub max_capture_seconds: f64,
    pub render_timeout_ms: u64,
    /// Fixes the Ghost reverb noise when set.
    pub reverb_seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            master_volume: DEFAULT_MASTER_VOLUME,
            max_capture_seconds: DEFAULT_MAX_CAPTURE_SECONDS,
            render_timeout_ms: DEFAULT_RENDER_TIMEOUT_MS,
            reverb_seed: None,
        }
    }
}

impl SessionSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: SessionSettings = serde_json::from_str(json)?;
        settings.validated()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let settings = Self::from_json_str(&contents)?;
        info!("loaded session settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp the volume and reject unusable limits.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        self.master_volume = clamp_master_volume(self.master_volume);
        if !self.max_capture_seconds.is_finite() || self.max_capture_seconds <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "max_capture_seconds must be positive, got {}",
                self.max_capture_seconds
            )));
        }
        if Duration::try_from_secs_f64(self.max_capture_seconds).is_err() {
            return Err(SettingsError::Invalid(format!(
                "max_capture_seconds is too large, got {}",
                self.max_capture_seconds
            )));
        }
        if self.render_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "render_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    /// Saturates at [`Duration::MAX`] for values too large to represent.
    pub fn max_capture_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_capture_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Volume as shown to users, 0 to 100.
    pub fn volume_percent(&self) -> u8 {
        (self.master_volume * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = SessionSettings::default();
        assert_eq!(settings.master_volume, 0.7);
        assert_eq!(settings.volume_percent(), 70);
        assert_eq!(settings.max_capture_duration(), Duration::from_secs(30));
        assert_eq!(settings.render_timeout(), Duration::from_secs(30));
        assert_eq!(settings.reverb_seed, None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings = SessionSettings::from_json_str(r#"{ "reverb_seed": 12 }"#).unwrap();
        assert_eq!(settings.reverb_seed, Some(12));
        assert_eq!(settings.max_capture_seconds, 30.0);
    }

    #[test]
    fn volume_is_clamped_on_load() {
        let settings = SessionSettings::from_json_str(r#"{ "master_volume": 1.8 }"#).unwrap();
        assert_eq!(settings.master_volume, 1.0);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            SessionSettings::from_json_str(r#"{ "max_capture_seconds": 0 }"#),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            SessionSettings::from_json_str("{ not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn oversized_capture_limit_is_rejected() {
        assert!(matches!(
            SessionSettings::from_json_str(r#"{ "max_capture_seconds": 1e20 }"#),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn unvalidated_capture_limit_saturates() {
        let settings = SessionSettings {
            max_capture_seconds: 1e20,
            ..SessionSettings::default()
        };
        assert_eq!(settings.max_capture_duration(), Duration::MAX);
        let settings = SessionSettings {
            max_capture_seconds: f64::NAN,
            ..SessionSettings::default()
        };
        assert_eq!(settings.max_capture_duration(), Duration::ZERO);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let original = SessionSettings {
            master_volume: 0.25,
            reverb_seed: Some(4),
            ..SessionSettings::default()
        };
        fs::write(&path, original.to_json_string().unwrap()).unwrap();
        assert_eq!(SessionSettings::from_json_file(&path).unwrap(), original);
    }
}
