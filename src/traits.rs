//! Core collaborator traits for the dispatch planner.
//!
//! The engine never computes road distances itself. It consumes a
//! [`DistanceOracle`], and batch backends can feed one through a
//! [`DistanceMatrixProvider`].

use serde::{Deserialize, Serialize};

use crate::model::Location;

/// Travel cost between two locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Distance {
    pub meters: u64,
    pub seconds: u64,
}

impl Distance {
    /// Sentinel for pairs the backend could not route.
    ///
    /// Large enough to push placements away, small enough that
    /// `meters * seconds` for a handful of legs stays inside `i64`.
    pub const UNREACHABLE: Distance = Distance {
        meters: 10_000_000,
        seconds: 10_000_000,
    };

    pub const ZERO: Distance = Distance {
        meters: 0,
        seconds: 0,
    };

    pub fn new(meters: u64, seconds: u64) -> Self {
        Self { meters, seconds }
    }

    pub fn is_unreachable(&self) -> bool {
        *self == Self::UNREACHABLE
    }

    /// Leg cost used by the distance constraints: seconds times meters.
    pub fn cost(&self) -> i64 {
        (self.seconds as i64).saturating_mul(self.meters as i64)
    }
}

/// Answers point-to-point travel queries.
///
/// Implementations must be cheap to call repeatedly (memoized or
/// precomputed) and must never fail: unroutable pairs return
/// [`Distance::UNREACHABLE`].
pub trait DistanceOracle: Send + Sync {
    fn distance(&self, from: &Location, to: &Location) -> Distance;
}

impl<T: DistanceOracle + ?Sized> DistanceOracle for &T {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        (**self).distance(from, to)
    }
}

impl<T: DistanceOracle + ?Sized> DistanceOracle for std::sync::Arc<T> {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        (**self).distance(from, to)
    }
}

/// Provides a full distance matrix for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Location]) -> Vec<Vec<Distance>>;
}
