//! Capture settings handed over by the host
//!
//! Persistence of these values stays with the host app; the core only reads them.

use crate::interface::KopiError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_ITEMS: u32 = 50;
pub const DEFAULT_POLLING_INTERVAL_SECONDS: f64 = 0.5;

/// Shortest polling interval accepted
const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    /// Retention ceiling applied after every capture
    pub max_items: u32,
    pub polling_interval_seconds: f64,
    /// When false the loop still tracks the clipboard but persists nothing
    pub auto_capture_enabled: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            polling_interval_seconds: DEFAULT_POLLING_INTERVAL_SECONDS,
            auto_capture_enabled: true,
        }
    }
}

impl CaptureSettings {
    /// Parse a JSON settings blob. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, KopiError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| KopiError::InvalidInput(format!("Invalid settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), KopiError> {
        self.polling_interval().map(|_| ())
    }

    /// The polling interval as a `Duration`, or `InvalidInput` if it is unusable
    pub fn polling_interval(&self) -> Result<Duration, KopiError> {
        let seconds = self.polling_interval_seconds;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(KopiError::InvalidInput(format!(
                "Polling interval must be a positive number of seconds, got {seconds}"
            )));
        }
        let interval = Duration::try_from_secs_f64(seconds)
            .map_err(|e| KopiError::InvalidInput(format!("Polling interval out of range: {e}")))?;
        if interval < MIN_POLLING_INTERVAL {
            return Err(KopiError::InvalidInput(format!(
                "Polling interval must be at least {}ms",
                MIN_POLLING_INTERVAL.as_millis()
            )));
        }
        Ok(interval)
    }
}

/// Default settings, for hosts that have none stored yet
#[uniffi::export]
pub fn default_capture_settings() -> CaptureSettings {
    CaptureSettings::default()
}
