//! Dispatch service tests: independent problems solved side by side.

mod fixtures;

use std::sync::Arc;

use dispatch_planner::service::DispatchService;
use dispatch_planner::solver::{SolveOptions, SolverState};

use fixtures::{spread_problem, PlaneOracle, TestDriver, TestOrder};

fn service(step_limit: Option<u64>) -> DispatchService {
    DispatchService::new(
        Arc::new(PlaneOracle),
        SolveOptions {
            step_limit,
            seed: 5,
            ..SolveOptions::default()
        },
    )
}

#[test]
fn test_concurrent_problems_are_isolated() {
    let service = service(Some(300));
    let (orders_a, drivers_a) = spread_problem(5, 2);
    let (orders_b, drivers_b) = spread_problem(7, 3);

    let a = service.submit(orders_a, drivers_a).unwrap();
    let b = service.submit(orders_b, drivers_b).unwrap();
    assert_ne!(a, b);

    let report_a = service.wait(a).unwrap();
    let report_b = service.wait(b).unwrap();

    assert_eq!(report_a.state, SolverState::Solved);
    assert_eq!(report_b.state, SolverState::Solved);
    assert_eq!(report_a.routes.len(), 2);
    assert_eq!(report_b.routes.len(), 3);
    let stops_b: usize = report_b.routes.iter().map(|r| r.stops.len()).sum();
    assert_eq!(stops_b, 14);
}

#[test]
fn test_status_is_readable_while_solving() {
    let service = service(None);
    let (orders, drivers) = spread_problem(8, 2);
    let id = service.submit(orders, drivers).unwrap();

    let status = service.status(id).unwrap();
    assert_ne!(status.state, SolverState::Solved);

    service.cancel(id);
    let report = service.wait(id).unwrap();
    assert_eq!(report.state, SolverState::Terminated);
    assert!(report.unassigned_order_ids.is_empty());
}

#[test]
fn test_problem_without_drivers_fails() {
    let service = service(Some(10));
    let orders = vec![
        TestOrder::new("r1").pickup(1.0, 0.0).dropoff(2.0, 0.0).build(),
        TestOrder::new("r2").pickup(3.0, 0.0).dropoff(4.0, 0.0).build(),
    ];

    let id = service.submit(orders, Vec::new()).unwrap();
    let report = service.wait(id).unwrap();

    assert_eq!(report.state, SolverState::Failed);
    assert_eq!(report.unassigned_order_ids, vec!["r1", "r2"]);
}

#[test]
fn test_problem_without_orders_solves_empty() {
    let service = service(Some(10));
    let id = service
        .submit(Vec::new(), vec![TestDriver::new("d1").build()])
        .unwrap();
    let report = service.wait(id).unwrap();

    assert_eq!(report.state, SolverState::Solved);
    assert_eq!(report.score.hard, 0);
    assert!(report.routes[0].stops.is_empty());
}
