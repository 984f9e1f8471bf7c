use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStatus {
    Active,
    LowBattery,
    LowSignal,
}

impl TelemetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::LowBattery => "low_battery",
            Self::LowSignal => "low_signal",
        }
    }
}

impl fmt::Display for TelemetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "low_battery" => Ok(Self::LowBattery),
            "low_signal" => Ok(Self::LowSignal),
            other => Err(format!("unknown telemetry status '{other}'")),
        }
    }
}

/// One timestamped kinematic reading for a path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub path_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub battery: f64,
    pub signal_strength: f64,
    pub status: TelemetryStatus,
    pub timestamp: DateTime<Utc>,
}

/// Fleet-wide averages over the latest sample of every path
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetStats {
    pub active_drones: usize,
    pub avg_altitude: f64,
    pub avg_speed: f64,
    pub avg_battery: f64,
    pub avg_signal: f64,
}

impl FleetStats {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a TelemetrySample>) -> Self {
        let mut stats = Self::default();
        for sample in samples {
            stats.active_drones += 1;
            stats.avg_altitude += sample.altitude;
            stats.avg_speed += sample.speed;
            stats.avg_battery += sample.battery;
            stats.avg_signal += sample.signal_strength;
        }
        if stats.active_drones > 0 {
            let n = stats.active_drones as f64;
            stats.avg_altitude /= n;
            stats.avg_speed /= n;
            stats.avg_battery /= n;
            stats.avg_signal /= n;
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&TelemetrySample> for TrajectoryPoint {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            lat: sample.latitude,
            lon: sample.longitude,
            timestamp: sample.timestamp,
        }
    }
}
