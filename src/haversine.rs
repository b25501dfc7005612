//! Straight-line distance oracle for when no routing backend is reachable.
//!
//! Meters follow the great circle; seconds assume a constant road speed.

use crate::model::Location;
use crate::traits::{Distance, DistanceOracle};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaversineOracle {
    /// Road speed used to turn meters into seconds.
    pub speed_kmh: f64,
}

impl Default for HaversineOracle {
    fn default() -> Self {
        Self::new(40.0)
    }
}

impl HaversineOracle {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    fn seconds_for(&self, meters: f64) -> u64 {
        if !(self.speed_kmh > 0.0) {
            return Distance::UNREACHABLE.seconds;
        }
        let meters_per_second = self.speed_kmh / 3.6;
        (meters / meters_per_second).round() as u64
    }
}

/// Great-circle distance in meters.
pub fn great_circle_meters(from: &Location, to: &Location) -> f64 {
    let (phi1, phi2) = (from.latitude().to_radians(), to.latitude().to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (to.longitude() - from.longitude()).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

impl DistanceOracle for HaversineOracle {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        if from.key() == to.key() {
            return Distance::ZERO;
        }
        let meters = great_circle_meters(from, to);
        if !meters.is_finite() {
            return Distance::UNREACHABLE;
        }
        Distance::new(meters.round() as u64, self.seconds_for(meters))
    }
}
