use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analyzer::SeverityThresholds;
use crate::error::{CrashGuardError, Result};
use crate::event_log::DEFAULT_HISTORY_CAPACITY;
use crate::report::default_device_info;

/// Tunables for detection and escalation. Any field omitted from a JSON
/// config file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub thresholds: SeverityThresholds,
    /// Detections within this window after the last one are suppressed
    pub cooldown_ms: i64,
    pub critical_countdown_secs: u32,
    pub default_countdown_secs: u32,
    /// Urgent haptics fire on every tick at or below this many seconds
    pub urgent_from_secs: u32,
    pub history_capacity: usize,
    pub locale: String,
    pub map_host: String,
    pub device_info: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            thresholds: SeverityThresholds::default(),
            cooldown_ms: 30_000,
            critical_countdown_secs: 10,
            default_countdown_secs: 15,
            urgent_from_secs: 5,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            locale: "en-US".to_string(),
            map_host: "maps.google.com".to_string(),
            device_info: default_device_info(),
        }
    }
}

impl DetectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DetectorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.minor > 0.0 && t.minor < t.moderate && t.moderate < t.severe && t.severe < t.critical) {
            return Err(CrashGuardError::InvalidConfig(format!(
                "thresholds must be positive and strictly ascending (got {} / {} / {} / {})",
                t.minor, t.moderate, t.severe, t.critical
            )));
        }
        if self.cooldown_ms < 0 {
            return Err(CrashGuardError::InvalidConfig(
                "cooldown_ms must not be negative".to_string(),
            ));
        }
        if self.critical_countdown_secs == 0 || self.default_countdown_secs == 0 {
            return Err(CrashGuardError::InvalidConfig(
                "countdowns must be at least 1 second".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(CrashGuardError::InvalidConfig(
                "history_capacity must be > 0".to_string(),
            ));
        }
        if self.map_host.trim().is_empty() {
            return Err(CrashGuardError::InvalidConfig(
                "map_host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
