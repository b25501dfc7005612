//! Hierarchical scoring of a route graph.
//!
//! Scores are penalties: lower is better and [`Score::ZERO`] is a perfect
//! plan. Every constraint is either a per-driver or a per-ride term, so the
//! evaluator caches both and rescoring after a move only touches the drivers
//! the move changed and the rides that have a visit on them.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::graph::{DriverIdx, NodeRef, RideId, RouteGraph, Touched, VisitRole};
use crate::model::Location;

/// Three-tier penalty compared lexicographically: hard, then medium, then soft.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Score {
    pub hard: i64,
    pub medium: i64,
    pub soft: i64,
}

impl Score {
    pub const ZERO: Score = Score {
        hard: 0,
        medium: 0,
        soft: 0,
    };

    pub fn new(hard: i64, medium: i64, soft: i64) -> Self {
        Self { hard, medium, soft }
    }

    pub fn of_hard(hard: i64) -> Self {
        Self::new(hard, 0, 0)
    }

    pub fn of_medium(medium: i64) -> Self {
        Self::new(0, medium, 0)
    }

    pub fn of_soft(soft: i64) -> Self {
        Self::new(0, 0, soft)
    }

    pub fn is_feasible(&self) -> bool {
        self.hard == 0
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score::new(self.hard + rhs.hard, self.medium + rhs.medium, self.soft + rhs.soft)
    }
}

impl Sub for Score {
    type Output = Score;

    fn sub(self, rhs: Score) -> Score {
        Score::new(self.hard - rhs.hard, self.medium - rhs.medium, self.soft - rhs.soft)
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, rhs: Score) {
        *self = *self + rhs;
    }
}

impl SubAssign for Score {
    fn sub_assign(&mut self, rhs: Score) {
        *self = *self - rhs;
    }
}

impl Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Score {
        iter.fold(Score::ZERO, Add::add)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{}medium/{}soft", self.hard, self.medium, self.soft)
    }
}

/// Tier the capacity constraint is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityTier {
    #[default]
    Hard,
    Soft,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintConfig {
    pub max_visits_per_vehicle: usize,
    pub capacity_tier: CapacityTier,
    /// Where vehicles return to. Falls back to each vehicle's origin.
    pub hub: Option<Location>,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            max_visits_per_vehicle: 20,
            capacity_tier: CapacityTier::Hard,
            hub: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    SameVehicle,
    PickupBeforeDropoff,
    Capacity,
    VisitsPerVehicle,
    DistanceToPrevious,
    ReturnToHub,
}

impl Constraint {
    pub const ALL: [Constraint; 6] = [
        Constraint::SameVehicle,
        Constraint::PickupBeforeDropoff,
        Constraint::Capacity,
        Constraint::VisitsPerVehicle,
        Constraint::DistanceToPrevious,
        Constraint::ReturnToHub,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Constraint::SameVehicle => "same vehicle pickup/dropoff",
            Constraint::PickupBeforeDropoff => "pickup before dropoff",
            Constraint::Capacity => "capacity",
            Constraint::VisitsPerVehicle => "visits per vehicle",
            Constraint::DistanceToPrevious => "distance to previous",
            Constraint::ReturnToHub => "return to hub",
        }
    }
}

/// Total contribution of one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstraintMatch {
    pub constraint: Constraint,
    pub score: Score,
}

#[derive(Debug, Clone)]
pub struct ConstraintEvaluator {
    config: ConstraintConfig,
    driver_scores: Vec<Score>,
    ride_scores: Vec<Score>,
    total: Score,
}

impl ConstraintEvaluator {
    pub fn new(config: ConstraintConfig) -> Self {
        Self {
            config,
            driver_scores: Vec::new(),
            ride_scores: Vec::new(),
            total: Score::ZERO,
        }
    }

    pub fn config(&self) -> &ConstraintConfig {
        &self.config
    }

    /// Cached total as of the last [`reset`](Self::reset) or [`update`](Self::update).
    pub fn score(&self) -> Score {
        self.total
    }

    /// Scores the whole graph from scratch without touching the cache.
    pub fn full(&self, graph: &RouteGraph<'_>) -> Score {
        let drivers: Score = (0..graph.drivers().len())
            .map(|driver| self.driver_score(graph, driver))
            .sum();
        let rides: Score = (0..graph.rides().len())
            .map(|ride| self.ride_score(graph, ride))
            .sum();
        drivers + rides
    }

    /// Rebuilds the per-driver and per-ride caches.
    pub fn reset(&mut self, graph: &RouteGraph<'_>) -> Score {
        self.driver_scores = (0..graph.drivers().len())
            .map(|driver| self.driver_score(graph, driver))
            .collect();
        self.ride_scores = (0..graph.rides().len())
            .map(|ride| self.ride_score(graph, ride))
            .collect();
        self.total = self.driver_scores.iter().copied().sum::<Score>()
            + self.ride_scores.iter().copied().sum::<Score>();
        self.total
    }

    /// Rescores only what `touched` names, plus every ride with a visit on a
    /// touched driver.
    pub fn update(&mut self, graph: &RouteGraph<'_>, touched: &Touched) -> Score {
        if self.driver_scores.len() != graph.drivers().len()
            || self.ride_scores.len() != graph.rides().len()
        {
            return self.reset(graph);
        }

        let mut rides = touched.rides.clone();
        for &driver in &touched.drivers {
            let fresh = self.driver_score(graph, driver);
            self.total += fresh - self.driver_scores[driver];
            self.driver_scores[driver] = fresh;

            for visit in graph.route(driver) {
                let ride = graph.visit(visit).ride();
                if !rides.contains(&ride) {
                    rides.push(ride);
                }
            }
        }

        for ride in rides {
            let fresh = self.ride_score(graph, ride);
            self.total += fresh - self.ride_scores[ride];
            self.ride_scores[ride] = fresh;
        }

        self.total
    }

    /// Per-constraint totals, computed from scratch.
    pub fn breakdown(&self, graph: &RouteGraph<'_>) -> Vec<ConstraintMatch> {
        Constraint::ALL
            .iter()
            .map(|&constraint| {
                let drivers = (0..graph.drivers().len())
                    .map(|driver| self.driver_term(graph, driver, constraint))
                    .sum::<Score>();
                let rides = (0..graph.rides().len())
                    .map(|ride| self.ride_term(graph, ride, constraint))
                    .sum::<Score>();
                ConstraintMatch {
                    constraint,
                    score: drivers + rides,
                }
            })
            .collect()
    }

    fn driver_score(&self, graph: &RouteGraph<'_>, driver: DriverIdx) -> Score {
        [
            Constraint::Capacity,
            Constraint::VisitsPerVehicle,
            Constraint::DistanceToPrevious,
            Constraint::ReturnToHub,
        ]
        .into_iter()
        .map(|constraint| self.driver_term(graph, driver, constraint))
        .sum()
    }

    fn ride_score(&self, graph: &RouteGraph<'_>, ride: RideId) -> Score {
        self.ride_term(graph, ride, Constraint::SameVehicle)
            + self.ride_term(graph, ride, Constraint::PickupBeforeDropoff)
    }

    fn driver_term(&self, graph: &RouteGraph<'_>, driver: DriverIdx, constraint: Constraint) -> Score {
        match constraint {
            Constraint::Capacity => {
                let overflows = capacity_overflows(graph, driver);
                match self.config.capacity_tier {
                    CapacityTier::Hard => Score::of_hard(overflows),
                    CapacityTier::Soft => Score::of_soft(overflows),
                }
            }
            Constraint::VisitsPerVehicle => {
                let count = graph.route(driver).len();
                Score::of_hard(i64::from(count > self.config.max_visits_per_vehicle))
            }
            Constraint::DistanceToPrevious => Score::of_medium(travel_cost(graph, driver)),
            Constraint::ReturnToHub => Score::of_medium(self.return_cost(graph, driver)),
            Constraint::SameVehicle | Constraint::PickupBeforeDropoff => Score::ZERO,
        }
    }

    fn ride_term(&self, graph: &RouteGraph<'_>, ride: RideId, constraint: Constraint) -> Score {
        let ride = graph.ride(ride);
        let pickup = graph.visit(ride.pickup()).derived();
        let dropoff = graph.visit(ride.dropoff()).derived();
        match constraint {
            Constraint::SameVehicle => {
                let split = match (pickup.driver, dropoff.driver) {
                    (None, None) => false,
                    (a, b) => a != b,
                };
                Score::of_hard(i64::from(split))
            }
            Constraint::PickupBeforeDropoff => match (pickup, dropoff) {
                (p, d) if p.driver.is_some() && p.driver == d.driver => {
                    let (p, d) = (p.index.unwrap_or(0) as i64, d.index.unwrap_or(0) as i64);
                    Score::of_hard(if p >= d { (p - d).abs() } else { 0 })
                }
                _ => Score::ZERO,
            },
            _ => Score::ZERO,
        }
    }

    fn return_cost(&self, graph: &RouteGraph<'_>, driver: DriverIdx) -> i64 {
        let Some(tail) = graph.tail_of(driver) else {
            return 0;
        };
        let hub = self.config.hub.as_ref().unwrap_or(graph.driver(driver).origin());
        graph
            .oracle()
            .distance(graph.visit(tail).location(), hub)
            .cost()
    }
}

/// Pickups at which the load on board exceeds the vehicle's capacity.
fn capacity_overflows(graph: &RouteGraph<'_>, driver: DriverIdx) -> i64 {
    let max = graph.driver(driver).max_capacity();
    graph
        .route(driver)
        .into_iter()
        .filter(|&visit| graph.visit(visit).role() == VisitRole::Pickup && graph.load_of(visit) > max)
        .count() as i64
}

/// Sum of `seconds * meters` over every leg of the chain, anchor first.
fn travel_cost(graph: &RouteGraph<'_>, driver: DriverIdx) -> i64 {
    let mut previous = NodeRef::Driver(driver);
    let mut cost = 0i64;
    for visit in graph.route(driver) {
        cost = cost.saturating_add(graph.distance(previous, NodeRef::Visit(visit)).cost());
        previous = NodeRef::Visit(visit);
    }
    cost
}
