//! Shared fixtures for unit tests.

use crate::model::{Driver, Location, Order, Parcel};
use crate::traits::{Distance, DistanceOracle};

/// Treats (lat, lng) as plane coordinates; one unit is one meter and one second.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanOracle;

impl DistanceOracle for EuclideanOracle {
    fn distance(&self, from: &Location, to: &Location) -> Distance {
        let (x1, y1) = from.coords();
        let (x2, y2) = to.coords();
        let d = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt().round() as u64;
        Distance::new(d, d)
    }
}

/// `rides` orders along the x axis (pickup at `(i+1, 0)`, dropoff at
/// `(i+1, 1)`, weight 1) and `drivers` drivers at `(0, -j)` with capacity 100.
pub fn line_problem(rides: usize, drivers: usize) -> (Vec<Order>, Vec<Driver>) {
    let orders = (0..rides)
        .map(|i| {
            let x = (i + 1) as f64;
            Order::new(
                format!("o{i}"),
                Location::pickup(x, 0.0),
                Location::dropoff(x, 1.0),
                Parcel::with_weight(1),
            )
        })
        .collect();
    let drivers = (0..drivers)
        .map(|j| Driver::new(format!("d{j}"), Location::origin(0.0, -(j as f64)), 100))
        .collect();
    (orders, drivers)
}

pub fn order(id: &str, pickup: (f64, f64), dropoff: (f64, f64), weight: u32) -> Order {
    Order::new(
        id,
        Location::pickup(pickup.0, pickup.1),
        Location::dropoff(dropoff.0, dropoff.1),
        Parcel::with_weight(weight),
    )
}

pub fn driver(id: &str, origin: (f64, f64), max_capacity: u32) -> Driver {
    Driver::new(id, Location::origin(origin.0, origin.1), max_capacity)
}
