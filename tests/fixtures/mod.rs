//! Test fixtures for dispatch-planner.
//!
//! Provides:
//! - A planar distance oracle (coordinates read as meters, one meter per second)
//! - Builders for orders and drivers

#![allow(dead_code)]

use dispatch_planner::model::{Driver, Location, Order, Parcel};
use dispatch_planner::traits::{Distance, DistanceOracle};

// ============================================================================
// Distance
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneOracle;

impl DistanceOracle for PlaneOracle {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        let dx = to.latitude() - from.latitude();
        let dy = to.longitude() - from.longitude();
        let d = (dx * dx + dy * dy).sqrt().round() as u64;
        Distance::new(d, d)
    }
}

// ============================================================================
// Builders
// ============================================================================

#[derive(Clone, Debug)]
pub struct TestOrder {
    id: String,
    pickup: (f64, f64),
    dropoff: (f64, f64),
    parcel: Parcel,
}

impl TestOrder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            pickup: (0.0, 0.0),
            dropoff: (0.0, 0.0),
            parcel: Parcel::with_weight(1),
        }
    }

    pub fn pickup(mut self, x: f64, y: f64) -> Self {
        self.pickup = (x, y);
        self
    }

    pub fn dropoff(mut self, x: f64, y: f64) -> Self {
        self.dropoff = (x, y);
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.parcel.weight = weight;
        self
    }

    pub fn build(self) -> Order {
        Order::new(
            self.id,
            Location::pickup(self.pickup.0, self.pickup.1),
            Location::dropoff(self.dropoff.0, self.dropoff.1),
            self.parcel,
        )
    }
}

#[derive(Clone, Debug)]
pub struct TestDriver {
    id: String,
    origin: (f64, f64),
    capacity: u32,
}

impl TestDriver {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            origin: (0.0, 0.0),
            capacity: 100,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.origin = (x, y);
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build(self) -> Driver {
        Driver::new(self.id, Location::origin(self.origin.0, self.origin.1), self.capacity)
    }
}

/// `rides` short hops spread along the x axis and `drivers` drivers stacked
/// below the origin.
pub fn spread_problem(rides: usize, drivers: usize) -> (Vec<Order>, Vec<Driver>) {
    let orders = (0..rides)
        .map(|i| {
            let x = (i * 3 + 1) as f64;
            TestOrder::new(&format!("r{i}"))
                .pickup(x, (i % 4) as f64)
                .dropoff(x + 1.0, (i % 3) as f64 + 1.0)
                .weight((i % 5) as u32 + 1)
                .build()
        })
        .collect();
    let drivers = (0..drivers)
        .map(|j| TestDriver::new(&format!("d{j}")).at(0.0, -(j as f64) * 2.0).capacity(8).build())
        .collect();
    (orders, drivers)
}
