//! Per-path kinematic state and its random walk.

use chrono::Utc;
use fastrand::Rng;

use super::flight_pattern::{uniform, FlightPattern};
use crate::config::RandomWalkConfig;
use crate::models::{TelemetrySample, TelemetryStatus};

const INITIAL_BATTERY: (f64, f64) = (60.0, 100.0);
const INITIAL_SIGNAL: (f64, f64) = (70.0, 100.0);
const PERCENT: (f64, f64) = (0.0, 100.0);

#[derive(Debug, Clone)]
pub struct DroneModel {
    pattern: FlightPattern,
    current: TelemetrySample,
}

impl DroneModel {
    /// Fresh model at `(lat, lon)` with randomized starting readings
    pub fn new(rng: &mut Rng, path_id: &str, lat: f64, lon: f64, walk: &RandomWalkConfig) -> Self {
        let altitude = uniform(rng, walk.altitude_min, walk.altitude_max);
        let speed = uniform(rng, walk.speed_min, walk.speed_max);
        let battery = uniform(rng, INITIAL_BATTERY.0, INITIAL_BATTERY.1);
        let signal_strength = uniform(rng, INITIAL_SIGNAL.0, INITIAL_SIGNAL.1);
        let pattern = FlightPattern::random(rng, lat, lon);

        let mut current = TelemetrySample {
            path_id: path_id.to_string(),
            latitude: lat,
            longitude: lon,
            altitude,
            speed,
            battery,
            signal_strength,
            status: TelemetryStatus::Active,
            timestamp: Utc::now(),
        };
        current.status = derive_status(&current, walk);
        Self { pattern, current }
    }

    /// Resume from a persisted sample; its readings become the starting point
    pub fn from_seed(rng: &mut Rng, seed: &TelemetrySample, walk: &RandomWalkConfig) -> Self {
        let pattern = FlightPattern::random(rng, seed.latitude, seed.longitude);
        let mut current = seed.clone();
        current.altitude = current.altitude.clamp(walk.altitude_min, walk.altitude_max);
        current.speed = current.speed.clamp(walk.speed_min, walk.speed_max);
        current.battery = current.battery.clamp(PERCENT.0, PERCENT.1);
        current.signal_strength = current.signal_strength.clamp(PERCENT.0, PERCENT.1);
        current.status = derive_status(&current, walk);
        current.timestamp = Utc::now();
        Self { pattern, current }
    }

    pub fn pattern(&self) -> &FlightPattern {
        &self.pattern
    }

    pub fn current(&self) -> &TelemetrySample {
        &self.current
    }

    /// Move to `elapsed` seconds into the flight and perturb the readings
    pub fn advance(&mut self, rng: &mut Rng, elapsed: f64, walk: &RandomWalkConfig) -> TelemetrySample {
        let (lat, lon) = self.pattern.position(elapsed);
        let c = &mut self.current;
        c.latitude = lat;
        c.longitude = lon;

        c.altitude = (c.altitude + uniform(rng, -walk.altitude_step, walk.altitude_step))
            .clamp(walk.altitude_min, walk.altitude_max);
        c.speed = (c.speed + uniform(rng, -walk.speed_step, walk.speed_step))
            .clamp(walk.speed_min, walk.speed_max);
        c.battery = (c.battery - uniform(rng, walk.battery_drain_min, walk.battery_drain_max))
            .clamp(PERCENT.0, PERCENT.1);
        c.signal_strength = (c.signal_strength + uniform(rng, -walk.signal_step, walk.signal_step))
            .clamp(PERCENT.0, PERCENT.1);
        c.timestamp = Utc::now();
        c.status = derive_status(c, walk);

        c.clone()
    }
}

fn derive_status(sample: &TelemetrySample, walk: &RandomWalkConfig) -> TelemetryStatus {
    if sample.battery <= 0.0 {
        TelemetryStatus::LowBattery
    } else if sample.signal_strength < walk.low_signal_threshold {
        TelemetryStatus::LowSignal
    } else {
        TelemetryStatus::Active
    }
}
