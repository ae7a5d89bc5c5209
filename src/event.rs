use serde::{Deserialize, Serialize};

use crate::analyzer::{ImpactAnalysis, Severity};
use crate::types::{Gyroscope, LocationSnapshot};

/// Stored crash category. Severe and critical analyses share "severe".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashType {
    Minor,
    Moderate,
    Severe,
}

impl CrashType {
    /// `None` for safe readings, which never produce an event
    pub fn from_severity(severity: Severity) -> Option<Self> {
        match severity {
            Severity::Safe => None,
            Severity::Minor => Some(CrashType::Minor),
            Severity::Moderate => Some(CrashType::Moderate),
            Severity::Severe | Severity::Critical => Some(CrashType::Severe),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrashType::Minor => "minor",
            CrashType::Moderate => "moderate",
            CrashType::Severe => "severe",
        }
    }
}

/// A detected impact, either logged as a bump or escalated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashEvent {
    pub id: String,
    pub timestamp: i64,
    pub g_force: f64,
    #[serde(rename = "type")]
    pub crash_type: CrashType,
    pub location: Option<LocationSnapshot>,
    pub speed: Option<f64>,
    pub gyro_data: Gyroscope,
    pub reported: bool,
}

impl CrashEvent {
    /// Build an unreported event from an analysis. Returns `None` for safe readings.
    pub fn from_analysis(
        analysis: &ImpactAnalysis,
        timestamp: i64,
        gyro_data: Gyroscope,
        location: Option<LocationSnapshot>,
    ) -> Option<Self> {
        let crash_type = CrashType::from_severity(analysis.severity)?;

        Some(CrashEvent {
            id: format!("crash_{}", timestamp),
            timestamp,
            g_force: analysis.g_force,
            crash_type,
            speed: location.and_then(|l| l.speed_kmh),
            location,
            gyro_data,
            reported: false,
        })
    }
}
