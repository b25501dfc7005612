//! Dispatch solver: greedy construction followed by hill-climbing local search.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::graph::{DriverIdx, NodeRef, RideId, RouteGraph, VisitRole};
use crate::model::{Driver, Location, Order, ValidationError, validate};
use crate::moves::{Move, random_move};
use crate::score::{CapacityTier, ConstraintConfig, ConstraintEvaluator, Score};
use crate::traits::DistanceOracle;

const DEFAULT_STEP_LIMIT: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Stop after this many improvement steps.
    pub step_limit: Option<u64>,
    /// Stop after this much wall-clock time in the improvement phase.
    pub time_limit_ms: Option<u64>,
    /// Vehicles carrying more visits than this are hard-penalized.
    pub max_visits_per_vehicle: usize,
    pub capacity_tier: CapacityTier,
    /// Seed for move selection.
    pub seed: u64,
    /// Where vehicles return to. Each vehicle's origin when unset.
    pub hub: Option<Location>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            step_limit: Some(DEFAULT_STEP_LIMIT),
            time_limit_ms: None,
            max_visits_per_vehicle: 20,
            capacity_tier: CapacityTier::Hard,
            seed: 0,
            hub: None,
        }
    }
}

impl SolveOptions {
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// True when neither a step nor a time limit is set.
    pub fn is_unbounded(&self) -> bool {
        self.step_limit.is_none() && self.time_limit_ms.is_none()
    }

    pub fn constraint_config(&self) -> ConstraintConfig {
        ConstraintConfig {
            max_visits_per_vehicle: self.max_visits_per_vehicle,
            capacity_tier: self.capacity_tier,
            hub: self.hub,
        }
    }
}

/// Cooperative stop flag, polled between moves.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverState {
    Unsolved,
    Constructing,
    Improving,
    /// Budget exhausted or nothing left to try.
    Solved,
    /// Cancelled before the budget ran out.
    Terminated,
    /// No drivers to assign to.
    Failed,
}

impl SolverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SolverState::Solved | SolverState::Terminated | SolverState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStop {
    pub order_id: String,
    pub kind: VisitRole,
    pub index: usize,
    pub arrival_seconds: u64,
    pub load: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub driver_id: String,
    pub stops: Vec<PlannedStop>,
    /// Seconds from the origin to the last stop.
    pub travel_seconds: u64,
}

/// Snapshot of a plan, detached from the graph it was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub state: SolverState,
    pub score: Score,
    pub routes: Vec<PlannedRoute>,
    pub unassigned_order_ids: Vec<String>,
    pub steps: u64,
}

impl Solution {
    fn unplanned(state: SolverState, orders: &[Order], drivers: &[Driver]) -> Self {
        Self {
            state,
            score: Score::ZERO,
            routes: drivers
                .iter()
                .map(|driver| PlannedRoute {
                    driver_id: driver.id.clone(),
                    stops: Vec::new(),
                    travel_seconds: 0,
                })
                .collect(),
            unassigned_order_ids: orders.iter().map(|order| order.id.clone()).collect(),
            steps: 0,
        }
    }

    pub fn route_for(&self, driver_id: &str) -> Option<&PlannedRoute> {
        self.routes.iter().find(|route| route.driver_id == driver_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not worse than the current score; kept.
    Accepted,
    /// Worse; undone.
    Reverted,
    /// Structurally invalid; nothing changed.
    Rejected,
}

/// Working state of one solve: graph, cached score and move source.
pub struct LocalSearch<'a> {
    graph: RouteGraph<'a>,
    evaluator: ConstraintEvaluator,
    rng: StdRng,
    current: Score,
    unplaced: Vec<RideId>,
}

impl<'a> LocalSearch<'a> {
    pub fn new(graph: RouteGraph<'a>, options: &SolveOptions) -> Self {
        let mut evaluator = ConstraintEvaluator::new(options.constraint_config());
        let current = evaluator.reset(&graph);
        Self {
            graph,
            evaluator,
            rng: StdRng::seed_from_u64(options.seed),
            current,
            unplaced: Vec::new(),
        }
    }

    pub fn graph(&self) -> &RouteGraph<'a> {
        &self.graph
    }

    pub fn evaluator(&self) -> &ConstraintEvaluator {
        &self.evaluator
    }

    pub fn score(&self) -> Score {
        self.current
    }

    /// Greedy construction: each pickup goes after the nearest chain tail,
    /// preferring vehicles it would not overload, and its dropoff after the
    /// nearest point at or behind the pickup.
    pub fn construct(&mut self) -> Score {
        self.unplaced.clear();
        for ride in 0..self.graph.rides().len() {
            if !self.place_ride(ride) {
                self.unplaced.push(ride);
            }
        }
        self.graph.take_touched();
        self.current = self.evaluator.reset(&self.graph);
        self.current
    }

    fn place_ride(&mut self, ride: RideId) -> bool {
        let (pickup, dropoff, weight) = {
            let ride = self.graph.ride(ride);
            (ride.pickup(), ride.dropoff(), ride.parcel().weight as i64)
        };

        let Some(pickup_after) = self.nearest_tail(pickup, weight) else {
            return false;
        };
        let first = match self.graph.attach(pickup, pickup_after) {
            Ok(undo) => undo,
            Err(err) => {
                debug_assert!(false, "construction attach failed: {err}");
                tracing::warn!(ride, error = %err, "could not place pickup");
                return false;
            }
        };

        let dropoff_at = self.graph.location_of(NodeRef::Visit(dropoff));
        let dropoff_after = std::iter::once(pickup)
            .chain(self.graph.successors(NodeRef::Visit(pickup)))
            .min_by_key(|&visit| {
                self.graph
                    .oracle()
                    .distance(self.graph.visit(visit).location(), dropoff_at)
                    .meters
            })
            .map_or(NodeRef::Visit(pickup), NodeRef::Visit);

        if let Err(err) = self.graph.attach(dropoff, dropoff_after) {
            debug_assert!(false, "construction attach failed: {err}");
            tracing::warn!(ride, error = %err, "could not place dropoff");
            if let Err(err) = self.graph.undo(first) {
                tracing::warn!(ride, error = %err, "could not roll back pickup");
            }
            return false;
        }
        true
    }

    fn nearest_tail(&self, pickup: usize, weight: i64) -> Option<NodeRef> {
        let cap = self.evaluator.config().max_visits_per_vehicle;
        let target = self.graph.location_of(NodeRef::Visit(pickup));
        (0..self.graph.drivers().len())
            .map(|driver: DriverIdx| {
                let chain = self.graph.route(driver);
                let tail = chain.last().map_or(NodeRef::Driver(driver), |&v| NodeRef::Visit(v));
                let risk = u8::from(chain.len() + 2 > cap)
                    + u8::from(self.graph.route_load(driver) + weight > self.graph.driver(driver).max_capacity());
                let meters = self
                    .graph
                    .oracle()
                    .distance(self.graph.location_of(tail), target)
                    .meters;
                (risk, meters, driver, tail)
            })
            .min_by_key(|&(risk, meters, driver, _)| (risk, meters, driver))
            .map(|(_, _, _, tail)| tail)
    }

    /// Applies `mv`, keeps it when the score is not worse, otherwise undoes it.
    pub fn try_move(&mut self, mv: Move) -> StepOutcome {
        let undo = match mv.apply(&mut self.graph) {
            Ok(undo) => undo,
            Err(err) => {
                tracing::warn!(?mv, error = %err, "skipping structurally invalid move");
                self.resync();
                return StepOutcome::Rejected;
            }
        };

        let touched = self.graph.take_touched();
        let candidate = self.evaluator.update(&self.graph, &touched);
        if candidate <= self.current {
            self.current = candidate;
            return StepOutcome::Accepted;
        }

        if let Err(err) = undo.revert(&mut self.graph) {
            debug_assert!(false, "undo failed: {err}");
            tracing::warn!(?mv, error = %err, "undo failed");
        }
        self.resync();
        StepOutcome::Reverted
    }

    /// Draws and tries one random move. `None` when no move is legal.
    pub fn step(&mut self) -> Option<StepOutcome> {
        let mv = random_move(&self.graph, &mut self.rng)?;
        let outcome = self.try_move(mv);
        debug_assert!(outcome != StepOutcome::Rejected, "move catalog produced {mv:?}");
        Some(outcome)
    }

    fn resync(&mut self) {
        let touched = self.graph.take_touched();
        self.current = self.evaluator.update(&self.graph, &touched);
    }

    /// Deep copy of the current plan.
    pub fn snapshot(&self, state: SolverState, steps: u64) -> Solution {
        let graph = &self.graph;
        let routes = (0..graph.drivers().len())
            .map(|driver| {
                let stops: Vec<PlannedStop> = graph
                    .route(driver)
                    .into_iter()
                    .map(|visit| {
                        let node = graph.visit(visit);
                        let derived = node.derived();
                        PlannedStop {
                            order_id: graph.ride(node.ride()).order_id().to_string(),
                            kind: node.role(),
                            index: derived.index.unwrap_or_default(),
                            arrival_seconds: derived.arrival,
                            load: derived.load,
                        }
                    })
                    .collect();
                PlannedRoute {
                    driver_id: graph.driver(driver).id().to_string(),
                    travel_seconds: stops.last().map_or(0, |stop| stop.arrival_seconds),
                    stops,
                }
            })
            .collect();

        Solution {
            state,
            score: self.current,
            routes,
            unassigned_order_ids: self
                .unplaced
                .iter()
                .map(|&ride| graph.ride(ride).order_id().to_string())
                .collect(),
            steps,
        }
    }
}

/// Validates the input and runs a full solve.
///
/// Nothing can cancel this call, so options without any limit fall back to
/// the default step limit. Use [`solve_with`] for open-ended runs.
pub fn solve(
    orders: &[Order],
    drivers: &[Driver],
    oracle: &dyn DistanceOracle,
    mut options: SolveOptions,
) -> Result<Solution, ValidationError> {
    validate(orders, drivers)?;
    if options.is_unbounded() {
        tracing::warn!(step_limit = DEFAULT_STEP_LIMIT, "no step or time limit set, using default step limit");
        options.step_limit = Some(DEFAULT_STEP_LIMIT);
    }
    Ok(solve_with(
        orders,
        drivers,
        oracle,
        &options,
        &CancellationToken::new(),
        |_| {},
    ))
}

/// Runs a solve on already-validated input.
///
/// `listener` sees a snapshot on every state transition and every new best
/// score. The returned solution is the best one found, tagged with the
/// terminal state.
pub fn solve_with<F>(
    orders: &[Order],
    drivers: &[Driver],
    oracle: &dyn DistanceOracle,
    options: &SolveOptions,
    cancel: &CancellationToken,
    mut listener: F,
) -> Solution
where
    F: FnMut(&Solution),
{
    let started = Instant::now();
    tracing::info!(
        orders = orders.len(),
        drivers = drivers.len(),
        seed = options.seed,
        "starting dispatch solve"
    );

    if drivers.is_empty() {
        let failed = Solution::unplanned(SolverState::Failed, orders, drivers);
        tracing::info!(unassigned = failed.unassigned_order_ids.len(), "no drivers available");
        listener(&failed);
        return failed;
    }

    listener(&Solution::unplanned(SolverState::Constructing, orders, drivers));
    let mut search = LocalSearch::new(RouteGraph::new(orders, drivers, oracle), options);
    let constructed = search.construct();
    tracing::debug!(score = %constructed, "construction finished");
    for matched in search.evaluator().breakdown(search.graph()) {
        if matched.score != Score::ZERO {
            tracing::debug!(constraint = matched.constraint.name(), score = %matched.score, "constraint total");
        }
    }

    let mut best = search.snapshot(SolverState::Improving, 0);
    listener(&best);

    let deadline = options.time_limit().map(|limit| Instant::now() + limit);
    let mut steps = 0u64;
    let state = loop {
        if cancel.is_cancelled() {
            break SolverState::Terminated;
        }
        if options.step_limit.is_some_and(|limit| steps >= limit) {
            break SolverState::Solved;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break SolverState::Solved;
        }

        if search.step().is_none() {
            break SolverState::Solved;
        }
        steps += 1;

        if search.score() < best.score {
            best = search.snapshot(SolverState::Improving, steps);
            tracing::debug!(score = %best.score, step = steps, "new best");
            listener(&best);
        }
    };

    best.state = state;
    best.steps = steps;
    tracing::info!(
        state = ?state,
        score = %best.score,
        feasible = best.score.is_feasible(),
        steps,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dispatch solve finished"
    );
    listener(&best);
    best
}
