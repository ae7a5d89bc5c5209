use serde::{Deserialize, Serialize};

/// Accelerometer reading in m/s² (gravity included)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Acceleration {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Gyroscope reading (alpha/beta/gamma rates in deg/s)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gyroscope {
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
}

impl Gyroscope {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    pub fn magnitude(&self) -> f64 {
        (self.alpha * self.alpha + self.beta * self.beta + self.gamma * self.gamma).sqrt()
    }
}

/// One synchronized accelerometer + gyroscope observation.
///
/// `timestamp` is milliseconds since the Unix epoch. Missing axes are
/// defaulted to 0 when deserialized, so every sample reaching the
/// analyzer is fully numeric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp: i64,
    #[serde(default)]
    pub acceleration: Acceleration,
    #[serde(default)]
    pub gyroscope: Gyroscope,
}

impl SensorSample {
    pub fn new(timestamp: i64, acceleration: Acceleration, gyroscope: Gyroscope) -> Self {
        Self {
            timestamp,
            acceleration,
            gyroscope,
        }
    }
}

/// Position and speed captured when a crash event is built
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: Option<f64>,
}

impl LocationSnapshot {
    pub fn new(latitude: f64, longitude: f64, speed_kmh: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh,
        }
    }
}

/// Source of the rider's current position, queried (not pushed) at
/// crash-event construction time.
pub trait LocationProvider {
    fn current_location(&self) -> Option<LocationSnapshot>;
}

/// Provider for setups without a GPS fix
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current_location(&self) -> Option<LocationSnapshot> {
        None
    }
}

impl LocationProvider for Option<LocationSnapshot> {
    fn current_location(&self) -> Option<LocationSnapshot> {
        *self
    }
}
