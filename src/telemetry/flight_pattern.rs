//! Closed-form flight paths, one payload struct per pattern.

use fastrand::Rng;
use serde::{Deserialize, Serialize};

/// Draw uniformly from `[low, high)`
pub(crate) fn uniform(rng: &mut Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CirclePattern {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius: f64,
    pub angular_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure8Pattern {
    pub center_lat: f64,
    pub center_lon: f64,
    pub width: f64,
    pub height: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZigzagPattern {
    pub start_lat: f64,
    pub start_lon: f64,
    pub width: f64,
    pub height: f64,
    pub speed: f64,
    /// +1 or -1, flipped near each sawtooth period boundary
    pub direction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "lowercase")]
pub enum FlightPattern {
    Circle(CirclePattern),
    Figure8(Figure8Pattern),
    Zigzag(ZigzagPattern),
}

impl FlightPattern {
    /// Pick a pattern uniformly and randomize its parameters around a center
    pub fn random(rng: &mut Rng, center_lat: f64, center_lon: f64) -> Self {
        match rng.u8(0..3) {
            0 => Self::Circle(CirclePattern {
                center_lat,
                center_lon,
                radius: uniform(rng, 0.005, 0.015),
                angular_speed: uniform(rng, 0.5, 2.0),
            }),
            1 => Self::Figure8(Figure8Pattern {
                center_lat,
                center_lon,
                width: uniform(rng, 0.01, 0.02),
                height: uniform(rng, 0.005, 0.015),
                speed: uniform(rng, 0.5, 2.0),
            }),
            _ => Self::Zigzag(ZigzagPattern {
                start_lat: center_lat,
                start_lon: center_lon,
                width: uniform(rng, 0.01, 0.02),
                height: uniform(rng, 0.005, 0.015),
                speed: uniform(rng, 0.5, 2.0),
                direction: 1.0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Circle(_) => "circle",
            Self::Figure8(_) => "figure8",
            Self::Zigzag(_) => "zigzag",
        }
    }

    /// Latitude/longitude at `t` seconds into the flight
    pub fn position(&mut self, t: f64) -> (f64, f64) {
        match self {
            Self::Circle(p) => {
                let angle = t * p.angular_speed;
                (
                    p.center_lat + p.radius * angle.cos(),
                    p.center_lon + p.radius * angle.sin(),
                )
            }
            Self::Figure8(p) => {
                let angle = t * p.speed;
                (
                    p.center_lat + p.height * angle.sin(),
                    p.center_lon + p.width * (2.0 * angle).sin(),
                )
            }
            Self::Zigzag(p) => {
                let scaled = t * p.speed;
                let phase = scaled.rem_euclid(2.0);
                let position = (
                    p.start_lat + p.height * scaled.sin(),
                    p.start_lon + p.width * (phase - 1.0) * p.direction,
                );
                if phase < 0.1 {
                    p.direction = -p.direction;
                }
                position
            }
        }
    }
}
