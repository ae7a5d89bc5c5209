use serde::{Deserialize, Serialize};

use crate::types::{Acceleration, Gyroscope};

/// Impact severity, ordered from harmless to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Safe,
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Safe => "safe",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Critical => "critical",
        }
    }

    /// Whether this level interrupts the rider with a countdown
    pub fn escalates(&self) -> bool {
        *self >= Severity::Moderate
    }
}

/// Axis of largest acceleration and its sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactDirection {
    Left,
    Right,
    Forward,
    Backward,
    Upward,
    Downward,
    None,
}

impl ImpactDirection {
    /// Pick the axis with the largest absolute value. Ties go to the
    /// earlier axis in x, y, z order.
    pub fn from_acceleration(accel: &Acceleration) -> Self {
        let (ax, ay, az) = (accel.x.abs(), accel.y.abs(), accel.z.abs());
        let max = ax.max(ay).max(az);

        if max == 0.0 {
            ImpactDirection::None
        } else if ax == max {
            if accel.x > 0.0 {
                ImpactDirection::Right
            } else {
                ImpactDirection::Left
            }
        } else if ay == max {
            if accel.y > 0.0 {
                ImpactDirection::Forward
            } else {
                ImpactDirection::Backward
            }
        } else if accel.z > 0.0 {
            ImpactDirection::Upward
        } else {
            ImpactDirection::Downward
        }
    }
}

/// Lower bounds (inclusive, m/s²) for each non-safe severity level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub severe: f64,
    pub critical: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            minor: 15.0,
            moderate: 25.0,
            severe: 40.0,
            critical: 60.0,
        }
    }
}

impl SeverityThresholds {
    /// Highest threshold first, first match wins
    pub fn classify(&self, g_force: f64) -> Severity {
        if g_force >= self.critical {
            Severity::Critical
        } else if g_force >= self.severe {
            Severity::Severe
        } else if g_force >= self.moderate {
            Severity::Moderate
        } else if g_force >= self.minor {
            Severity::Minor
        } else {
            Severity::Safe
        }
    }
}

/// Result of analyzing one sample. Recomputed per sample, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    pub g_force: f64,
    pub rotation_rate: f64,
    pub impact_direction: ImpactDirection,
    pub severity: Severity,
    /// Heuristic 0-100 score. Descriptive only; never gates escalation.
    pub confidence: f64,
}

/// Stateless classifier for accelerometer + gyroscope readings
#[derive(Debug, Clone, Default)]
pub struct ImpactAnalyzer {
    thresholds: SeverityThresholds,
}

impl ImpactAnalyzer {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    pub fn analyze(&self, acceleration: &Acceleration, gyroscope: &Gyroscope) -> ImpactAnalysis {
        let g_force = acceleration.magnitude();
        let rotation_rate = gyroscope.magnitude();

        ImpactAnalysis {
            g_force,
            rotation_rate,
            impact_direction: ImpactDirection::from_acceleration(acceleration),
            severity: self.thresholds.classify(g_force),
            confidence: confidence(g_force, rotation_rate),
        }
    }
}

/// `min(100, (g/10)*20 + (rotation/100)*30)`
pub fn confidence(g_force: f64, rotation_rate: f64) -> f64 {
    ((g_force / 10.0) * 20.0 + (rotation_rate / 100.0) * 30.0).min(100.0)
}
