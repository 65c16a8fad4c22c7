//! Configuration management for metering parameters
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling tuning of cadences, buffer sizes, thresholds and alert timings
//! without recompilation. Every value defaults to the engine's reference
//! behaviour when the file is missing or malformed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub metering: MeteringConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

/// Periodic sampling and classification parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Short cadence: one device reading per tick
    pub sample_interval_ms: u64,
    /// Long cadence: one loudness ratio per interval
    pub loudness_interval_ms: u64,
    /// Readings averaged into one published decibel value
    pub decibel_buffer_size: usize,
    /// Ratios averaged into one classification
    pub ratio_buffer_size: usize,
    /// Oldest ratios dropped after each classification
    pub ratio_buffer_drain: usize,
    /// Mean ratio above which status becomes Caution
    pub caution_ratio: f32,
    /// Assumed distance between the phone and the listener (metres)
    pub listener_distance_m: f32,
    /// Assumed distance between the phone and the user (metres)
    pub reference_distance_m: f32,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 100,
            loudness_interval_ms: 500,
            decibel_buffer_size: 5,
            ratio_buffer_size: 4,
            ratio_buffer_drain: 2,
            caution_ratio: 1.3,
            listener_distance_m: 1.5,
            reference_distance_m: 0.5,
        }
    }
}

impl MeteringConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    /// Number of short ticks per long-cadence loudness computation
    pub fn ticks_per_loudness(&self) -> u64 {
        (self.loudness_interval_ms / self.sample_interval_ms.max(1)).max(1)
    }
}

/// Background-noise calibration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Length of the ambient sampling window
    pub window_ms: u64,
    /// Cadence of ambient readings
    pub sample_interval_ms: u64,
    /// Loudest baseline the orchestrating layer accepts
    pub max_plausible_db: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_ms: 3000,
            sample_interval_ms: 100,
            max_plausible_db: 75.0,
        }
    }
}

impl CalibrationConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    /// Number of readings averaged into the baseline (30 by default)
    pub fn sample_count(&self) -> usize {
        ((self.window_ms / self.sample_interval_ms.max(1)) as usize).max(1)
    }
}

/// Notification escalation timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Continuous caution before the persistent notification
    pub persistent_after_secs: u64,
    /// Continuous caution before the first recurring notification
    pub first_recurring_after_secs: u64,
    /// Spacing between recurring notifications
    pub recurring_interval_secs: u64,
    /// Delay handed to the notification service with every intent
    pub delivery_delay_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            persistent_after_secs: 20,
            first_recurring_after_secs: 20,
            recurring_interval_secs: 60,
            delivery_delay_ms: 100,
        }
    }
}

impl AlertConfig {
    pub fn persistent_after(&self) -> Duration {
        Duration::from_secs(self.persistent_after_secs)
    }

    pub fn first_recurring_after(&self) -> Duration {
        Duration::from_secs(self.first_recurring_after_secs)
    }

    pub fn recurring_interval(&self) -> Duration {
        // A zero interval would spin the dispatcher
        Duration::from_secs(self.recurring_interval_secs.max(1))
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file doesn't exist
    /// or the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/meter_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.metering.decibel_buffer_size, 5);
        assert_eq!(config.metering.ratio_buffer_size, 4);
        assert_eq!(config.metering.caution_ratio, 1.3);
        assert_eq!(config.metering.ticks_per_loudness(), 5);
        assert_eq!(config.calibration.sample_count(), 30);
        assert_eq!(config.alerts.persistent_after(), Duration::from_secs(20));
        assert_eq!(config.alerts.recurring_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            parsed.metering.loudness_interval_ms,
            config.metering.loudness_interval_ms
        );
        assert_eq!(
            parsed.calibration.max_plausible_db,
            config.calibration.max_plausible_db
        );
    }

    #[test]
    fn test_partial_json_fills_missing_sections() {
        let json = r#"{"alerts":{"persistent_after_secs":5,"first_recurring_after_secs":5,"recurring_interval_secs":10,"delivery_delay_ms":0}}"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.alerts.persistent_after_secs, 5);
        assert_eq!(parsed.metering.decibel_buffer_size, 5);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("does/not/exist.json");
        assert_eq!(config.calibration.window_ms, 3000);
    }

    #[test]
    fn test_degenerate_intervals_are_clamped() {
        let metering = MeteringConfig {
            sample_interval_ms: 0,
            loudness_interval_ms: 0,
            ..MeteringConfig::default()
        };
        assert_eq!(metering.ticks_per_loudness(), 1);
        assert_eq!(metering.sample_interval(), Duration::from_millis(1));
    }
}
