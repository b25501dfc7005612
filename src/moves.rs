//! Structural moves over the route graph.
//!
//! Every move is composite and atomic: its attachments are recorded as undo
//! tokens in application order, and a failure part-way rolls back whatever
//! already happened before the error is returned.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::{AttachUndo, GraphError, NodeRef, RideId, RouteGraph, VisitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    RideRelocate,
    RideSwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Move {
    /// Reattach a ride's pickup after `pickup_after`, then its dropoff after
    /// `dropoff_after` (the pickup itself or a visit following it).
    RideRelocate {
        ride: RideId,
        pickup_after: NodeRef,
        dropoff_after: NodeRef,
    },
    /// Exchange the positions of two rides' pickups, then of their dropoffs.
    RideSwap { first: RideId, second: RideId },
}

/// Undo tokens of one applied move, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveUndo {
    steps: Vec<AttachUndo>,
}

impl MoveUndo {
    /// Replays the tokens newest first.
    pub fn revert(self, graph: &mut RouteGraph<'_>) -> Result<(), GraphError> {
        for step in self.steps.into_iter().rev() {
            graph.undo(step)?;
        }
        Ok(())
    }
}

impl Move {
    pub fn kind(&self) -> MoveKind {
        match self {
            Move::RideRelocate { .. } => MoveKind::RideRelocate,
            Move::RideSwap { .. } => MoveKind::RideSwap,
        }
    }

    pub fn apply(&self, graph: &mut RouteGraph<'_>) -> Result<MoveUndo, GraphError> {
        let mut undo = MoveUndo::default();
        let result = match *self {
            Move::RideRelocate {
                ride,
                pickup_after,
                dropoff_after,
            } => relocate(graph, ride, pickup_after, dropoff_after, &mut undo.steps),
            Move::RideSwap { first, second } => swap_rides(graph, first, second, &mut undo.steps),
        };

        match result {
            Ok(()) => Ok(undo),
            Err(err) => {
                undo.revert(graph)?;
                Err(err)
            }
        }
    }
}

fn relocate(
    graph: &mut RouteGraph<'_>,
    ride: RideId,
    pickup_after: NodeRef,
    dropoff_after: NodeRef,
    steps: &mut Vec<AttachUndo>,
) -> Result<(), GraphError> {
    let (pickup, dropoff) = ride_visits(graph, ride)?;
    steps.push(graph.attach(pickup, pickup_after)?);
    steps.push(graph.attach(dropoff, dropoff_after)?);
    Ok(())
}

fn swap_rides(
    graph: &mut RouteGraph<'_>,
    first: RideId,
    second: RideId,
    steps: &mut Vec<AttachUndo>,
) -> Result<(), GraphError> {
    if first == second {
        return Ok(());
    }
    let (first_pickup, first_dropoff) = ride_visits(graph, first)?;
    let (second_pickup, second_dropoff) = ride_visits(graph, second)?;
    swap_positions(graph, first_pickup, second_pickup, steps)?;
    swap_positions(graph, first_dropoff, second_dropoff, steps)
}

fn ride_visits(graph: &RouteGraph<'_>, ride: RideId) -> Result<(VisitId, VisitId), GraphError> {
    graph
        .rides()
        .get(ride)
        .map(|ride| (ride.pickup(), ride.dropoff()))
        .ok_or(GraphError::UnknownNode(NodeRef::Visit(ride * 2)))
}

/// Exchanges the attachment points of two attached visits.
fn swap_positions(
    graph: &mut RouteGraph<'_>,
    x: VisitId,
    y: VisitId,
    steps: &mut Vec<AttachUndo>,
) -> Result<(), GraphError> {
    let x_after = graph
        .previous_of(x)
        .ok_or(GraphError::Dangling { node: NodeRef::Visit(x) })?;
    let y_after = graph
        .previous_of(y)
        .ok_or(GraphError::Dangling { node: NodeRef::Visit(y) })?;

    if y_after == NodeRef::Visit(x) {
        // x y -> y x
        steps.push(graph.attach(x, NodeRef::Visit(y))?);
    } else if x_after == NodeRef::Visit(y) {
        steps.push(graph.attach(y, NodeRef::Visit(x))?);
    } else {
        steps.push(graph.attach(x, y_after)?);
        steps.push(graph.attach(y, x_after)?);
    }
    Ok(())
}

/// Draws uniformly among the legal move kinds, then uniformly among that
/// kind's candidates. Returns `None` when no move is legal.
pub fn random_move<R: Rng + ?Sized>(graph: &RouteGraph<'_>, rng: &mut R) -> Option<Move> {
    let rides = graph.rides().len();
    let mut kinds = Vec::with_capacity(2);
    if rides >= 1 && graph.attachable_count() >= 4 {
        kinds.push(MoveKind::RideRelocate);
    }
    if rides >= 2 {
        kinds.push(MoveKind::RideSwap);
    }
    if kinds.is_empty() {
        return None;
    }

    match kinds[rng.random_range(0..kinds.len())] {
        MoveKind::RideRelocate => random_relocate(graph, rng),
        MoveKind::RideSwap => Some(random_swap(graph, rng)),
    }
}

fn random_relocate<R: Rng + ?Sized>(graph: &RouteGraph<'_>, rng: &mut R) -> Option<Move> {
    let ride = rng.random_range(0..graph.rides().len());
    let candidates = pickup_candidates(graph, ride);
    if candidates.is_empty() {
        return None;
    }
    let pickup_after = candidates[rng.random_range(0..candidates.len())];

    let candidates = dropoff_candidates(graph, ride, pickup_after);
    let dropoff_after = candidates[rng.random_range(0..candidates.len())];

    Some(Move::RideRelocate {
        ride,
        pickup_after,
        dropoff_after,
    })
}

fn random_swap<R: Rng + ?Sized>(graph: &RouteGraph<'_>, rng: &mut R) -> Move {
    let rides = graph.rides().len();
    let first = rng.random_range(0..rides);
    let mut second = rng.random_range(0..rides - 1);
    if second >= first {
        second += 1;
    }
    Move::RideSwap { first, second }
}

/// Every anchor plus every attached visit outside the ride.
pub fn pickup_candidates(graph: &RouteGraph<'_>, ride: RideId) -> Vec<NodeRef> {
    let own = graph.ride(ride);
    (0..graph.drivers().len())
        .map(NodeRef::Driver)
        .chain(
            (0..graph.visits().len())
                .filter(|&visit| !own.contains(visit) && graph.is_attached(visit))
                .map(NodeRef::Visit),
        )
        .collect()
}

/// The ride's pickup plus every visit that will follow it once the pickup
/// sits right after `pickup_after`.
pub fn dropoff_candidates(graph: &RouteGraph<'_>, ride: RideId, pickup_after: NodeRef) -> Vec<NodeRef> {
    let own = graph.ride(ride);
    std::iter::once(NodeRef::Visit(own.pickup()))
        .chain(
            graph
                .successors(pickup_after)
                .filter(|&visit| !own.contains(visit))
                .map(NodeRef::Visit),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{ConstraintConfig, ConstraintEvaluator};
    use crate::test_support::{driver, line_problem, order, EuclideanOracle};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_vehicle_graph(oracle: &EuclideanOracle) -> RouteGraph<'_> {
        let (orders, drivers) = line_problem(3, 2);
        let mut graph = RouteGraph::new(&orders, &drivers, oracle);
        graph.attach(0, NodeRef::Driver(0)).unwrap();
        graph.attach(1, NodeRef::Visit(0)).unwrap();
        graph.attach(2, NodeRef::Visit(1)).unwrap();
        graph.attach(3, NodeRef::Visit(2)).unwrap();
        graph.attach(4, NodeRef::Driver(1)).unwrap();
        graph.attach(5, NodeRef::Visit(4)).unwrap();
        graph
    }

    fn fingerprint(graph: &RouteGraph<'_>) -> Vec<(Option<NodeRef>, Option<usize>, Option<usize>)> {
        graph
            .visits()
            .iter()
            .map(|v| (v.previous, v.derived().index, v.derived().driver))
            .collect()
    }

    #[test]
    fn test_relocate_moves_ride_together() {
        let oracle = EuclideanOracle;
        let mut graph = two_vehicle_graph(&oracle);
        let mv = Move::RideRelocate {
            ride: 0,
            pickup_after: NodeRef::Visit(5),
            dropoff_after: NodeRef::Visit(0),
        };
        mv.apply(&mut graph).unwrap();
        assert_eq!(graph.route(0), vec![2, 3]);
        assert_eq!(graph.route(1), vec![4, 5, 0, 1]);
        assert_eq!(graph.check_structure(), Ok(()));
    }

    #[test]
    fn test_swap_exchanges_positions_across_vehicles() {
        let oracle = EuclideanOracle;
        let mut graph = two_vehicle_graph(&oracle);
        Move::RideSwap { first: 0, second: 2 }.apply(&mut graph).unwrap();
        assert_eq!(graph.route(0), vec![4, 5, 2, 3]);
        assert_eq!(graph.route(1), vec![0, 1]);
        assert_eq!(graph.check_structure(), Ok(()));
    }

    #[test]
    fn test_swap_adjacent_visits() {
        let oracle = EuclideanOracle;
        let (orders, drivers) = line_problem(2, 1);
        let mut graph = RouteGraph::new(&orders, &drivers, &oracle);
        // P0 P1 D0 D1
        graph.attach(0, NodeRef::Driver(0)).unwrap();
        graph.attach(2, NodeRef::Visit(0)).unwrap();
        graph.attach(1, NodeRef::Visit(2)).unwrap();
        graph.attach(3, NodeRef::Visit(1)).unwrap();

        Move::RideSwap { first: 0, second: 1 }.apply(&mut graph).unwrap();
        assert_eq!(graph.route(0), vec![2, 0, 3, 1]);
        assert_eq!(graph.check_structure(), Ok(()));
    }

    #[test]
    fn test_undo_restores_graph_and_score() {
        let oracle = EuclideanOracle;
        let mut graph = two_vehicle_graph(&oracle);
        let evaluator = ConstraintEvaluator::new(ConstraintConfig::default());
        let before = fingerprint(&graph);
        let score = evaluator.full(&graph);

        for mv in [
            Move::RideSwap { first: 1, second: 2 },
            Move::RideRelocate {
                ride: 2,
                pickup_after: NodeRef::Driver(0),
                dropoff_after: NodeRef::Visit(1),
            },
        ] {
            let undo = mv.apply(&mut graph).unwrap();
            assert_ne!(fingerprint(&graph), before);
            undo.revert(&mut graph).unwrap();
            assert_eq!(fingerprint(&graph), before);
            assert_eq!(evaluator.full(&graph), score);
        }
    }

    #[test]
    fn test_failed_move_rolls_back_first_half() {
        let oracle = EuclideanOracle;
        let mut graph = two_vehicle_graph(&oracle);
        let before = fingerprint(&graph);
        // The dropoff cannot follow itself.
        let mv = Move::RideRelocate {
            ride: 1,
            pickup_after: NodeRef::Driver(1),
            dropoff_after: NodeRef::Visit(3),
        };
        assert_eq!(mv.apply(&mut graph), Err(GraphError::Cycle { visit: 3 }));
        assert_eq!(fingerprint(&graph), before);
    }

    #[test]
    fn test_no_move_below_four_attachable_nodes() {
        let oracle = EuclideanOracle;
        let orders = vec![order("a", (1.0, 0.0), (2.0, 0.0), 1)];
        let drivers = vec![driver("d", (0.0, 0.0), 10)];
        let mut graph = RouteGraph::new(&orders, &drivers, &oracle);
        graph.attach(0, NodeRef::Driver(0)).unwrap();
        graph.attach(1, NodeRef::Visit(0)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(random_move(&graph, &mut rng), None);
    }

    #[test]
    fn test_dropoff_candidates_follow_pickup_slot() {
        let oracle = EuclideanOracle;
        let graph = two_vehicle_graph(&oracle);
        // Pickup of ride 0 going after visit 2 on driver 0: only visit 3 follows.
        let candidates = dropoff_candidates(&graph, 0, NodeRef::Visit(2));
        assert_eq!(candidates, vec![NodeRef::Visit(0), NodeRef::Visit(3)]);

        let candidates = pickup_candidates(&graph, 0);
        assert!(candidates.contains(&NodeRef::Driver(1)));
        assert!(!candidates.contains(&NodeRef::Visit(0)));
        assert!(!candidates.contains(&NodeRef::Visit(1)));
        assert_eq!(candidates.len(), 2 + 4);
    }

    #[test]
    fn test_seeded_moves_are_reproducible() {
        let oracle = EuclideanOracle;
        let graph = two_vehicle_graph(&oracle);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).map(|_| random_move(&graph, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_random_moves_keep_structure_and_counts() {
        let oracle = EuclideanOracle;
        let mut graph = two_vehicle_graph(&oracle);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let mv = random_move(&graph, &mut rng).expect("moves are available");
            mv.apply(&mut graph).unwrap();
            assert_eq!(graph.check_structure(), Ok(()));
            let attached = (0..graph.visits().len()).filter(|&v| graph.is_attached(v)).count();
            assert_eq!(attached, 6);
            assert_eq!(graph.rides().len(), 3);
        }
    }
}
