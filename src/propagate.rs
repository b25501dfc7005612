//! Derived-state propagation.
//!
//! After a splice only three visits have a new attachment point: the moved
//! visit, its old successor and its new successor. Each is recomputed and
//! the walk continues along `next` while values keep changing. A visit whose
//! recomputed values match what it already stores ends the walk, since every
//! value downstream is a function of it.

use crate::graph::{Derived, DriverIdx, NodeRef, RouteGraph, VisitId};

impl RouteGraph<'_> {
    /// Recomputes derived state starting at each of `starts`.
    pub(crate) fn propagate(&mut self, starts: &[Option<VisitId>]) {
        self.epoch += 1;
        let epoch = self.epoch;

        for &start in starts.iter().flatten() {
            // Already recomputed from its final predecessor during this pass.
            if self.visits[start].stamp == epoch {
                continue;
            }

            let mut cursor = Some(start);
            while let Some(visit) = cursor {
                let fresh = self.derive(visit);
                self.visits[visit].stamp = epoch;
                self.propagation_visits += 1;
                if fresh == self.visits[visit].derived {
                    break;
                }
                self.visits[visit].derived = fresh;
                cursor = self.visits[visit].next;
            }
        }
    }

    /// Values for `visit` given the current values of its attachment point.
    pub(crate) fn derive(&self, visit: VisitId) -> Derived {
        let node = &self.visits[visit];
        match node.previous {
            None => Derived::default(),
            Some(NodeRef::Driver(driver)) => Derived {
                index: Some(0),
                arrival: self.distance(NodeRef::Driver(driver), NodeRef::Visit(visit)).seconds,
                load: node.capacity_delta.max(0),
                driver: Some(driver),
            },
            Some(NodeRef::Visit(previous)) => {
                let before = self.visits[previous].derived;
                let leg = self.distance(NodeRef::Visit(previous), NodeRef::Visit(visit));
                Derived {
                    index: before.index.map(|index| index + 1),
                    arrival: before.arrival.saturating_add(leg.seconds),
                    load: (before.load + node.capacity_delta).max(0),
                    driver: before.driver,
                }
            }
        }
    }
}

/// Derived state of every visit computed by walking each chain from its
/// anchor, ignoring what the graph currently stores.
pub fn recompute_from_scratch(graph: &RouteGraph<'_>) -> Vec<Derived> {
    let mut derived = vec![Derived::default(); graph.visits().len()];
    for driver in 0..graph.drivers().len() {
        walk_chain(graph, driver, &mut derived);
    }
    derived
}

fn walk_chain(graph: &RouteGraph<'_>, driver: DriverIdx, out: &mut [Derived]) {
    let mut previous = NodeRef::Driver(driver);
    let mut state = Derived {
        index: None,
        arrival: 0,
        load: 0,
        driver: Some(driver),
    };
    for visit in graph.route(driver) {
        let leg = graph.distance(previous, NodeRef::Visit(visit));
        state = Derived {
            index: Some(state.index.map_or(0, |index| index + 1)),
            arrival: state.arrival.saturating_add(leg.seconds),
            load: (state.load + graph.visit(visit).capacity_delta()).max(0),
            driver: Some(driver),
        };
        out[visit] = state;
        previous = NodeRef::Visit(visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Driver, Location, Order, Parcel};
    use crate::test_support::{line_problem, EuclideanOracle};

    /// One driver whose chain is `0, 1, .., 2n-1` in visit-id order.
    fn straight_chain<'a>(
        orders: &[Order],
        drivers: &[Driver],
        oracle: &'a EuclideanOracle,
    ) -> RouteGraph<'a> {
        let mut graph = RouteGraph::new(orders, drivers, oracle);
        let mut previous = NodeRef::Driver(0);
        for visit in 0..graph.visits().len() {
            graph.attach(visit, previous).unwrap();
            previous = NodeRef::Visit(visit);
        }
        graph
    }

    #[test]
    fn test_arrival_and_load_accumulate() {
        // Driver at (0,0); ride 0 picks up at (1,0), drops at (2,0), weight 4.
        let orders = vec![Order::new(
            "o0",
            Location::pickup(1.0, 0.0),
            Location::dropoff(2.0, 0.0),
            Parcel::with_weight(4),
        )];
        let drivers = vec![Driver::new("d0", Location::origin(0.0, 0.0), 10)];
        let oracle = EuclideanOracle;
        let graph = straight_chain(&orders, &drivers, &oracle);

        assert_eq!(
            graph.visit(0).derived(),
            Derived { index: Some(0), arrival: 1, load: 4, driver: Some(0) }
        );
        assert_eq!(
            graph.visit(1).derived(),
            Derived { index: Some(1), arrival: 2, load: 0, driver: Some(0) }
        );
    }

    #[test]
    fn test_dropoff_before_pickup_floors_load_at_zero() {
        let (orders, drivers) = line_problem(1, 1);
        let oracle = EuclideanOracle;
        let mut graph = RouteGraph::new(&orders, &drivers, &oracle);
        graph.attach(1, NodeRef::Driver(0)).unwrap();
        graph.attach(0, NodeRef::Visit(1)).unwrap();
        assert_eq!(graph.load_of(1), 0);
        assert!(graph.load_of(0) > 0);
    }

    #[test]
    fn test_moving_tail_only_recomputes_tail() {
        let (orders, drivers) = line_problem(5, 2);
        let oracle = EuclideanOracle;
        let mut graph = straight_chain(&orders, &drivers, &oracle);
        let before = graph.propagation_visits();

        graph.attach(9, NodeRef::Driver(1)).unwrap();
        assert_eq!(graph.propagation_visits() - before, 1);
        assert!(graph.derived_matches_scratch());
    }

    #[test]
    fn test_early_exit_stops_at_unchanged_suffix() {
        // Every stop at the same spot with weightless parcels: swapping two
        // neighbours leaves everything after them untouched.
        let orders: Vec<Order> = (0..5)
            .map(|i| {
                Order::new(
                    format!("o{i}"),
                    Location::pickup(1.0, 1.0),
                    Location::dropoff(1.0, 1.0),
                    Parcel::default(),
                )
            })
            .collect();
        let drivers = vec![Driver::new("d0", Location::origin(0.0, 0.0), 10)];
        let oracle = EuclideanOracle;
        let mut graph = straight_chain(&orders, &drivers, &oracle);
        let before = graph.propagation_visits();

        // 0 1 2 3 4 5 ... -> 0 2 1 3 4 5 ...
        graph.attach(1, NodeRef::Visit(2)).unwrap();
        assert_eq!(graph.route(0)[..4], [0usize, 2, 1, 3]);
        // visit 2 (old successor), visit 1 (moved), visit 3 (new successor,
        // unchanged) and nothing further down the chain.
        assert_eq!(graph.propagation_visits() - before, 3);
        assert!(graph.derived_matches_scratch());
    }

    #[test]
    fn test_full_chain_rewrite_when_head_moves() {
        let (orders, drivers) = line_problem(3, 2);
        let oracle = EuclideanOracle;
        let mut graph = straight_chain(&orders, &drivers, &oracle);
        graph.attach(0, NodeRef::Driver(1)).unwrap();
        assert_eq!(graph.route(0), vec![1, 2, 3, 4, 5]);
        assert_eq!(graph.index_of(5), Some(4));
        assert!(graph.derived_matches_scratch());
    }

    #[test]
    fn test_scratch_leaves_detached_visits_default() {
        let (orders, drivers) = line_problem(2, 1);
        let oracle = EuclideanOracle;
        let mut graph = RouteGraph::new(&orders, &drivers, &oracle);
        graph.attach(2, NodeRef::Driver(0)).unwrap();
        let scratch = recompute_from_scratch(&graph);
        assert_eq!(scratch[0], Derived::default());
        assert_eq!(scratch[2].index, Some(0));
    }

    impl RouteGraph<'_> {
        fn derived_matches_scratch(&self) -> bool {
            let scratch = recompute_from_scratch(self);
            self.visits().iter().zip(scratch).all(|(visit, expected)| visit.derived() == expected)
        }
    }
}
