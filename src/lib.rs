//! dispatch-planner
//!
//! Assigns pickup/dropoff rides to drivers. Routes live in an arena graph
//! where each visit points at the node it follows; everything else about a
//! route is derived incrementally. A seeded hill-climbing search over ride
//! moves improves a greedy starting plan against a three-tier penalty score.

pub mod traits;
pub mod model;
pub mod haversine;
pub mod matrix;
pub mod osrm;
pub mod graph;
pub mod propagate;
pub mod moves;
pub mod score;
pub mod solver;
pub mod service;

#[cfg(test)]
mod test_support;

pub use graph::{GraphError, NodeRef, RouteGraph, VisitRole};
pub use model::{Driver, Location, LocationKind, Order, Parcel, ValidationError};
pub use score::{CapacityTier, Score};
pub use solver::{CancellationToken, Solution, SolveOptions, SolverState, solve, solve_with};
pub use traits::{Distance, DistanceOracle};
