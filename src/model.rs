//! Dispatch input model: locations, parcels, orders and drivers.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a location plays in the dispatch problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Pickup,
    Dropoff,
    VehicleOrigin,
    Hub,
}

/// A geo-coordinate tagged with its role. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    kind: LocationKind,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, kind: LocationKind) -> Self {
        Self {
            latitude,
            longitude,
            kind,
        }
    }

    pub fn pickup(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, LocationKind::Pickup)
    }

    pub fn dropoff(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, LocationKind::Dropoff)
    }

    pub fn origin(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, LocationKind::VehicleOrigin)
    }

    pub fn hub(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, LocationKind::Hub)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    /// (lat, lng) pair.
    pub fn coords(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Rounded coordinate key, ignoring the role tag. Two locations with the
    /// same key share a row in precomputed matrices.
    pub fn key(&self) -> LocationKey {
        LocationKey(
            (self.latitude * 1e6).round() as i64,
            (self.longitude * 1e6).round() as i64,
        )
    }

    fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Micro-degree coordinate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey(pub i64, pub i64);

/// Physical dimensions of a shipment. `weight` is the capacity-consuming quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parcel {
    pub length: u32,
    pub height: u32,
    pub width: u32,
    pub weight: u32,
}

impl Parcel {
    pub fn with_weight(weight: u32) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }
}

/// A delivery order: one pickup and one dropoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pickup: Location,
    pub dropoff: Location,
    #[serde(default)]
    pub parcel: Parcel,
}

impl Order {
    pub fn new(id: impl Into<String>, pickup: Location, dropoff: Location, parcel: Parcel) -> Self {
        Self {
            id: id.into(),
            pickup,
            dropoff,
            parcel,
        }
    }
}

/// An available driver and their vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub origin: Location,
    pub max_capacity: u32,
}

impl Driver {
    pub fn new(id: impl Into<String>, origin: Location, max_capacity: u32) -> Self {
        Self {
            id: id.into(),
            origin,
            max_capacity,
        }
    }
}

/// Which slot of the input a bad location was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSlot {
    Pickup,
    Dropoff,
    Origin,
}

impl fmt::Display for LocationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSlot::Pickup => f.write_str("pickup"),
            LocationSlot::Dropoff => f.write_str("dropoff"),
            LocationSlot::Origin => f.write_str("origin"),
        }
    }
}

/// Reasons a dispatch request is rejected before solving.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyOrderId,
    EmptyDriverId,
    DuplicateOrder(String),
    DuplicateDriver(String),
    InvalidCoordinates {
        id: String,
        slot: LocationSlot,
    },
    WrongLocationKind {
        id: String,
        slot: LocationSlot,
        found: LocationKind,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyOrderId => f.write_str("order with empty id"),
            ValidationError::EmptyDriverId => f.write_str("driver with empty id"),
            ValidationError::DuplicateOrder(id) => write!(f, "duplicate order id {id}"),
            ValidationError::DuplicateDriver(id) => write!(f, "duplicate driver id {id}"),
            ValidationError::InvalidCoordinates { id, slot } => {
                write!(f, "{id}: {slot} has missing or out-of-range coordinates")
            }
            ValidationError::WrongLocationKind { id, slot, found } => {
                write!(f, "{id}: {slot} location is tagged {found:?}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Rejects malformed orders and drivers before a route graph is built.
pub fn validate(orders: &[Order], drivers: &[Driver]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for order in orders {
        if order.id.is_empty() {
            return Err(ValidationError::EmptyOrderId);
        }
        if !seen.insert(order.id.as_str()) {
            return Err(ValidationError::DuplicateOrder(order.id.clone()));
        }
        check_location(&order.id, LocationSlot::Pickup, &order.pickup, LocationKind::Pickup)?;
        check_location(&order.id, LocationSlot::Dropoff, &order.dropoff, LocationKind::Dropoff)?;
    }

    let mut seen = HashSet::new();
    for driver in drivers {
        if driver.id.is_empty() {
            return Err(ValidationError::EmptyDriverId);
        }
        if !seen.insert(driver.id.as_str()) {
            return Err(ValidationError::DuplicateDriver(driver.id.clone()));
        }
        check_location(
            &driver.id,
            LocationSlot::Origin,
            &driver.origin,
            LocationKind::VehicleOrigin,
        )?;
    }

    Ok(())
}

fn check_location(
    id: &str,
    slot: LocationSlot,
    location: &Location,
    expected: LocationKind,
) -> Result<(), ValidationError> {
    if !location.has_valid_coordinates() {
        return Err(ValidationError::InvalidCoordinates {
            id: id.to_string(),
            slot,
        });
    }
    if location.kind() != expected {
        return Err(ValidationError::WrongLocationKind {
            id: id.to_string(),
            slot,
            found: location.kind(),
        });
    }
    Ok(())
}
