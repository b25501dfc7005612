//! Route graph: drivers as chain anchors, visits as chain nodes.
//!
//! Nodes live in two arenas addressed by stable indices. A visit's planning
//! attribute is its attachment point (`previous`), the element right before
//! it in its driver's chain. Everything else on a visit (`next`, index,
//! arrival, load, owning driver) is derived and maintained by
//! [`RouteGraph::attach`], the only mutation primitive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Driver, Location, Order, Parcel};
use crate::traits::{Distance, DistanceOracle};

/// Index of a visit in the graph's visit arena.
pub type VisitId = usize;
/// Index of a driver anchor.
pub type DriverIdx = usize;
/// Index of a ride (one order).
pub type RideId = usize;

/// An attachment point: either a driver anchor or another visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Driver(DriverIdx),
    Visit(VisitId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitRole {
    Pickup,
    Dropoff,
}

/// Per-visit values computed from the attachment chain, never set by moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Derived {
    /// 0-based position after the anchor. `None` while detached.
    pub index: Option<usize>,
    /// Seconds elapsed since leaving the vehicle origin.
    pub arrival: u64,
    /// Load on board after servicing this visit.
    pub load: i64,
    pub driver: Option<DriverIdx>,
}

#[derive(Debug, Clone)]
pub struct VisitNode {
    pub(crate) ride: RideId,
    pub(crate) role: VisitRole,
    pub(crate) location: Location,
    pub(crate) capacity_delta: i64,
    pub(crate) previous: Option<NodeRef>,
    pub(crate) next: Option<VisitId>,
    pub(crate) derived: Derived,
    pub(crate) stamp: u64,
}

impl VisitNode {
    pub fn ride(&self) -> RideId {
        self.ride
    }

    pub fn role(&self) -> VisitRole {
        self.role
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn capacity_delta(&self) -> i64 {
        self.capacity_delta
    }

    pub fn derived(&self) -> Derived {
        self.derived
    }
}

#[derive(Debug, Clone)]
pub struct DriverNode {
    pub(crate) id: String,
    pub(crate) origin: Location,
    pub(crate) max_capacity: i64,
    pub(crate) first: Option<VisitId>,
}

impl DriverNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &Location {
        &self.origin
    }

    pub fn max_capacity(&self) -> i64 {
        self.max_capacity
    }

    pub fn first(&self) -> Option<VisitId> {
        self.first
    }
}

/// One order's pickup and dropoff, bound together for their lifetime.
#[derive(Debug, Clone)]
pub struct Ride {
    pub(crate) order_id: String,
    pub(crate) pickup: VisitId,
    pub(crate) dropoff: VisitId,
    pub(crate) parcel: Parcel,
}

impl Ride {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn pickup(&self) -> VisitId {
        self.pickup
    }

    pub fn dropoff(&self) -> VisitId {
        self.dropoff
    }

    pub fn parcel(&self) -> &Parcel {
        &self.parcel
    }

    pub fn contains(&self, visit: VisitId) -> bool {
        self.pickup == visit || self.dropoff == visit
    }
}

/// Restores a single attachment. Moves keep these in application order and
/// replay them in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachUndo {
    pub visit: VisitId,
    pub previous: Option<NodeRef>,
}

/// Drivers and rides whose derived state or score contribution may have
/// changed since the last [`RouteGraph::take_touched`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Touched {
    pub drivers: Vec<DriverIdx>,
    pub rides: Vec<RideId>,
}

impl Touched {
    fn driver(&mut self, driver: Option<DriverIdx>) {
        if let Some(driver) = driver {
            if !self.drivers.contains(&driver) {
                self.drivers.push(driver);
            }
        }
    }

    fn ride(&mut self, ride: RideId) {
        if !self.rides.contains(&ride) {
            self.rides.push(ride);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.rides.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(NodeRef),
    /// Attaching a visit to itself.
    Cycle { visit: VisitId },
    /// The target (or a visit found while checking) does not reach an anchor.
    Dangling { node: NodeRef },
    /// `previous`/`next` pointers disagree.
    BrokenLink { visit: VisitId },
    /// Chain indices are not `0, 1, 2, ...` from the anchor.
    IndexGap { driver: DriverIdx },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(node) => write!(f, "unknown node {node:?}"),
            GraphError::Cycle { visit } => write!(f, "attaching visit {visit} would form a cycle"),
            GraphError::Dangling { node } => write!(f, "{node:?} does not reach a driver anchor"),
            GraphError::BrokenLink { visit } => write!(f, "inconsistent links around visit {visit}"),
            GraphError::IndexGap { driver } => write!(f, "chain indices of driver {driver} have gaps"),
        }
    }
}

impl std::error::Error for GraphError {}

pub struct RouteGraph<'a> {
    pub(crate) oracle: &'a dyn DistanceOracle,
    pub(crate) drivers: Vec<DriverNode>,
    pub(crate) visits: Vec<VisitNode>,
    pub(crate) rides: Vec<Ride>,
    pub(crate) touched: Touched,
    pub(crate) epoch: u64,
    pub(crate) propagation_visits: u64,
}

impl fmt::Debug for RouteGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGraph")
            .field("drivers", &self.drivers)
            .field("visits", &self.visits)
            .field("rides", &self.rides)
            .finish_non_exhaustive()
    }
}

impl<'a> RouteGraph<'a> {
    /// Builds an unassigned graph. Ride `i` owns visits `2i` (pickup) and
    /// `2i + 1` (dropoff).
    pub fn new(orders: &[Order], drivers: &[Driver], oracle: &'a dyn DistanceOracle) -> Self {
        let drivers = drivers
            .iter()
            .map(|driver| DriverNode {
                id: driver.id.clone(),
                origin: driver.origin,
                max_capacity: driver.max_capacity as i64,
                first: None,
            })
            .collect();

        let mut visits = Vec::with_capacity(orders.len() * 2);
        let mut rides = Vec::with_capacity(orders.len());
        for (ride, order) in orders.iter().enumerate() {
            let weight = order.parcel.weight as i64;
            let pickup = visits.len();
            visits.push(VisitNode::detached(ride, VisitRole::Pickup, order.pickup, weight));
            visits.push(VisitNode::detached(ride, VisitRole::Dropoff, order.dropoff, -weight));
            rides.push(Ride {
                order_id: order.id.clone(),
                pickup,
                dropoff: pickup + 1,
                parcel: order.parcel,
            });
        }

        Self {
            oracle,
            drivers,
            visits,
            rides,
            touched: Touched::default(),
            epoch: 0,
            propagation_visits: 0,
        }
    }

    pub fn drivers(&self) -> &[DriverNode] {
        &self.drivers
    }

    pub fn visits(&self) -> &[VisitNode] {
        &self.visits
    }

    pub fn rides(&self) -> &[Ride] {
        &self.rides
    }

    pub fn visit(&self, visit: VisitId) -> &VisitNode {
        &self.visits[visit]
    }

    pub fn ride(&self, ride: RideId) -> &Ride {
        &self.rides[ride]
    }

    pub fn driver(&self, driver: DriverIdx) -> &DriverNode {
        &self.drivers[driver]
    }

    /// Drivers plus visits: every node a visit could be attached after.
    pub fn attachable_count(&self) -> usize {
        self.drivers.len() + self.visits.len()
    }

    pub fn oracle(&self) -> &'a dyn DistanceOracle {
        self.oracle
    }

    pub fn location_of(&self, node: NodeRef) -> &Location {
        match node {
            NodeRef::Driver(driver) => &self.drivers[driver].origin,
            NodeRef::Visit(visit) => &self.visits[visit].location,
        }
    }

    pub fn distance(&self, from: NodeRef, to: NodeRef) -> Distance {
        self.oracle.distance(self.location_of(from), self.location_of(to))
    }

    pub fn previous_of(&self, visit: VisitId) -> Option<NodeRef> {
        self.visits[visit].previous
    }

    pub fn next_of(&self, node: NodeRef) -> Option<VisitId> {
        match node {
            NodeRef::Driver(driver) => self.drivers[driver].first,
            NodeRef::Visit(visit) => self.visits[visit].next,
        }
    }

    pub fn first_of(&self, driver: DriverIdx) -> Option<VisitId> {
        self.drivers[driver].first
    }

    pub fn driver_of(&self, visit: VisitId) -> Option<DriverIdx> {
        self.visits[visit].derived.driver
    }

    pub fn index_of(&self, visit: VisitId) -> Option<usize> {
        self.visits[visit].derived.index
    }

    pub fn arrival_of(&self, visit: VisitId) -> u64 {
        self.visits[visit].derived.arrival
    }

    pub fn load_of(&self, visit: VisitId) -> i64 {
        self.visits[visit].derived.load
    }

    pub fn is_attached(&self, visit: VisitId) -> bool {
        self.visits[visit].previous.is_some()
    }

    /// Visits strictly after `node` in its chain, in order.
    pub fn successors(&self, node: NodeRef) -> Successors<'_, 'a> {
        Successors {
            graph: self,
            cursor: self.next_of(node),
            remaining: self.visits.len(),
        }
    }

    /// Visit ids of a driver's chain, anchor excluded.
    pub fn route(&self, driver: DriverIdx) -> Vec<VisitId> {
        self.successors(NodeRef::Driver(driver)).collect()
    }

    /// Last visit of a driver's chain.
    pub fn tail_of(&self, driver: DriverIdx) -> Option<VisitId> {
        self.successors(NodeRef::Driver(driver)).last()
    }

    /// Load on board at the end of a driver's chain.
    pub fn route_load(&self, driver: DriverIdx) -> i64 {
        self.tail_of(driver).map_or(0, |tail| self.load_of(tail))
    }

    /// Total number of visits each propagation has recomputed so far.
    pub fn propagation_visits(&self) -> u64 {
        self.propagation_visits
    }

    pub fn take_touched(&mut self) -> Touched {
        std::mem::take(&mut self.touched)
    }

    /// Detaches `visit` from its current position, splicing its neighbours
    /// together, and reinserts it right after `target`.
    ///
    /// A target downstream of `visit` is a plain reorder: the splice happens
    /// before reinsertion, so no cycle can form. Attaching to oneself, or to a
    /// visit that does not itself reach an anchor, is rejected.
    pub fn attach(&mut self, visit: VisitId, target: NodeRef) -> Result<AttachUndo, GraphError> {
        self.check_visit(visit)?;
        self.check_target(visit, target)?;

        let undo = AttachUndo {
            visit,
            previous: self.visits[visit].previous,
        };
        if undo.previous == Some(target) {
            return Ok(undo);
        }

        self.touched.driver(self.visits[visit].derived.driver);
        self.touched.ride(self.visits[visit].ride);

        let old_next = self.unlink(visit);

        let new_next = self.next_of(target);
        self.set_next(target, Some(visit));
        self.visits[visit].previous = Some(target);
        self.visits[visit].next = new_next;
        if let Some(new_next) = new_next {
            self.visits[new_next].previous = Some(NodeRef::Visit(visit));
        }

        self.propagate(&[old_next, Some(visit), new_next]);
        self.touched.driver(self.visits[visit].derived.driver);

        Ok(undo)
    }

    /// Removes `visit` from its chain, leaving it unassigned. Only used to
    /// undo the first attachment of a visit.
    pub(crate) fn detach(&mut self, visit: VisitId) -> Result<AttachUndo, GraphError> {
        self.check_visit(visit)?;
        let undo = AttachUndo {
            visit,
            previous: self.visits[visit].previous,
        };
        if undo.previous.is_none() {
            return Ok(undo);
        }

        self.touched.driver(self.visits[visit].derived.driver);
        self.touched.ride(self.visits[visit].ride);

        let old_next = self.unlink(visit);
        self.visits[visit].derived = Derived::default();
        self.propagate(&[old_next]);

        Ok(undo)
    }

    /// Replays an undo token.
    pub fn undo(&mut self, token: AttachUndo) -> Result<(), GraphError> {
        match token.previous {
            Some(previous) => self.attach(token.visit, previous).map(drop),
            None => self.detach(token.visit).map(drop),
        }
    }

    /// Verifies links, acyclicity and index monotonicity for the whole graph.
    pub fn check_structure(&self) -> Result<(), GraphError> {
        let limit = self.attachable_count();
        for (visit, node) in self.visits.iter().enumerate() {
            if let Some(previous) = node.previous {
                if self.next_of(previous) != Some(visit) {
                    return Err(GraphError::BrokenLink { visit });
                }
                self.anchor_of(NodeRef::Visit(visit), limit)?;
            } else if node.next.is_some() {
                return Err(GraphError::BrokenLink { visit });
            }
            if let Some(next) = node.next {
                if self.visits[next].previous != Some(NodeRef::Visit(visit)) {
                    return Err(GraphError::BrokenLink { visit });
                }
            }
        }
        for driver in 0..self.drivers.len() {
            if let Some(first) = self.drivers[driver].first {
                if self.visits[first].previous != Some(NodeRef::Driver(driver)) {
                    return Err(GraphError::BrokenLink { visit: first });
                }
            }
            for (expected, visit) in self.route(driver).into_iter().enumerate() {
                let derived = self.visits[visit].derived;
                if derived.index != Some(expected) || derived.driver != Some(driver) {
                    return Err(GraphError::IndexGap { driver });
                }
            }
        }
        Ok(())
    }

    /// Walks attachment points up to the anchor, giving up after `limit` steps.
    pub fn anchor_of(&self, node: NodeRef, limit: usize) -> Result<DriverIdx, GraphError> {
        let mut cursor = node;
        for _ in 0..=limit {
            match cursor {
                NodeRef::Driver(driver) => return Ok(driver),
                NodeRef::Visit(visit) => match self.visits[visit].previous {
                    Some(previous) => cursor = previous,
                    None => return Err(GraphError::Dangling { node }),
                },
            }
        }
        Err(GraphError::Dangling { node })
    }

    fn check_visit(&self, visit: VisitId) -> Result<(), GraphError> {
        if visit < self.visits.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(NodeRef::Visit(visit)))
        }
    }

    fn check_target(&self, visit: VisitId, target: NodeRef) -> Result<(), GraphError> {
        match target {
            NodeRef::Driver(driver) if driver < self.drivers.len() => Ok(()),
            NodeRef::Driver(_) => Err(GraphError::UnknownNode(target)),
            NodeRef::Visit(other) if other >= self.visits.len() => Err(GraphError::UnknownNode(target)),
            NodeRef::Visit(other) if other == visit => Err(GraphError::Cycle { visit }),
            NodeRef::Visit(_) => self.anchor_of(target, self.attachable_count()).map(drop),
        }
    }

    fn set_next(&mut self, node: NodeRef, next: Option<VisitId>) {
        match node {
            NodeRef::Driver(driver) => self.drivers[driver].first = next,
            NodeRef::Visit(visit) => self.visits[visit].next = next,
        }
    }

    /// Splices `visit` out of its chain and returns its former successor.
    fn unlink(&mut self, visit: VisitId) -> Option<VisitId> {
        let previous = self.visits[visit].previous.take();
        let next = self.visits[visit].next.take();
        if let Some(previous) = previous {
            self.set_next(previous, next);
        }
        if let Some(next) = next {
            self.visits[next].previous = previous;
        }
        next
    }
}

impl VisitNode {
    fn detached(ride: RideId, role: VisitRole, location: Location, capacity_delta: i64) -> Self {
        Self {
            ride,
            role,
            location,
            capacity_delta,
            previous: None,
            next: None,
            derived: Derived::default(),
            stamp: 0,
        }
    }
}

pub struct Successors<'g, 'a> {
    graph: &'g RouteGraph<'a>,
    cursor: Option<VisitId>,
    remaining: usize,
}

impl Iterator for Successors<'_, '_> {
    type Item = VisitId;

    fn next(&mut self) -> Option<VisitId> {
        let current = self.cursor?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.cursor = self.graph.visits[current].next;
        Some(current)
    }
}
