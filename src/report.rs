use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::event::CrashEvent;
use crate::types::Gyroscope;

const UNKNOWN: &str = "Unknown";

/// Structured crash report handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub report_id: String,
    pub timestamp: String,
    pub severity: String,
    pub g_force: String,
    pub speed_at_impact: String,
    pub gyroscope: Gyroscope,
    pub location: String,
    pub map_link: Option<String>,
    pub device_info: String,
}

impl CrashReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Serializes confirmed crash events into reports
#[derive(Debug, Clone)]
pub struct CrashReportBuilder {
    map_host: String,
    device_info: String,
}

impl CrashReportBuilder {
    pub fn new(map_host: impl Into<String>, device_info: impl Into<String>) -> Self {
        Self {
            map_host: map_host.into(),
            device_info: device_info.into(),
        }
    }

    pub fn build(&self, event: &CrashEvent) -> CrashReport {
        let timestamp = Utc
            .timestamp_millis_opt(event.timestamp)
            .single()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let speed_at_impact = event
            .speed
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let (location, map_link) = match event.location {
            Some(loc) => (
                format!("{:.6}, {:.6}", loc.latitude, loc.longitude),
                Some(format!(
                    "https://{}/?q={:.6},{:.6}",
                    self.map_host, loc.latitude, loc.longitude
                )),
            ),
            None => (UNKNOWN.to_string(), None),
        };

        CrashReport {
            report_id: event.id.clone(),
            timestamp,
            severity: event.crash_type.as_str().to_string(),
            g_force: format!("{:.2}", event.g_force),
            speed_at_impact,
            gyroscope: event.gyro_data,
            location,
            map_link,
            device_info: self.device_info.clone(),
        }
    }
}

/// `crash_guard/<version> (<os>; <arch>)`
pub fn default_device_info() -> String {
    format!(
        "{}/{} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

impl Default for CrashReportBuilder {
    fn default() -> Self {
        Self::new("maps.google.com", default_device_info())
    }
}
