//! Multi-problem front end: one worker thread per submitted problem.
//!
//! Jobs share nothing but the read-only distance oracle. Each keeps its own
//! latest snapshot behind a lock so status can be read while the worker runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::model::{Driver, Order, ValidationError, validate};
use crate::score::Score;
use crate::solver::{CancellationToken, PlannedRoute, Solution, SolveOptions, SolverState, solve_with};
use crate::traits::DistanceOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProblemId(pub u64);

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "problem-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: SolverState,
    pub score: Score,
    pub routes: Vec<PlannedRoute>,
    pub unassigned_order_ids: Vec<String>,
}

impl From<&Solution> for StatusReport {
    fn from(solution: &Solution) -> Self {
        Self {
            state: solution.state,
            score: solution.score,
            routes: solution.routes.clone(),
            unassigned_order_ids: solution.unassigned_order_ids.clone(),
        }
    }
}

#[derive(Debug)]
pub enum SubmitError {
    Invalid(ValidationError),
    Spawn(std::io::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Invalid(e) => write!(f, "invalid problem: {}", e),
            SubmitError::Spawn(e) => write!(f, "failed to start worker: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<ValidationError> for SubmitError {
    fn from(e: ValidationError) -> Self {
        SubmitError::Invalid(e)
    }
}

impl From<std::io::Error> for SubmitError {
    fn from(e: std::io::Error) -> Self {
        SubmitError::Spawn(e)
    }
}

struct Job {
    latest: Arc<RwLock<StatusReport>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

pub struct DispatchService {
    oracle: Arc<dyn DistanceOracle>,
    options: SolveOptions,
    jobs: RwLock<HashMap<ProblemId, Arc<Job>>>,
    next_id: AtomicU64,
}

impl DispatchService {
    pub fn new(oracle: Arc<dyn DistanceOracle>, options: SolveOptions) -> Self {
        Self {
            oracle,
            options,
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Validates the problem and starts solving it on a dedicated thread.
    pub fn submit(&self, orders: Vec<Order>, drivers: Vec<Driver>) -> Result<ProblemId, SubmitError> {
        validate(&orders, &drivers)?;

        let id = ProblemId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let latest = Arc::new(RwLock::new(StatusReport {
            state: SolverState::Unsolved,
            score: Score::ZERO,
            routes: Vec::new(),
            unassigned_order_ids: orders.iter().map(|order| order.id.clone()).collect(),
        }));
        let cancel = CancellationToken::new();

        let worker = {
            let latest = Arc::clone(&latest);
            let cancel = cancel.clone();
            let oracle = Arc::clone(&self.oracle);
            let options = self.options.clone();
            std::thread::Builder::new()
                .name(format!("dispatch-{}", id.0))
                .spawn(move || {
                    let _span = tracing::info_span!("dispatch_job", problem = %id).entered();
                    solve_with(&orders, &drivers, oracle.as_ref(), &options, &cancel, |snapshot| {
                        if snapshot.state.is_terminal() {
                            tracing::debug!(state = ?snapshot.state, score = %snapshot.score, "job finished");
                        }
                        *latest.write() = StatusReport::from(snapshot);
                    });
                })?
        };

        self.jobs.write().insert(
            id,
            Arc::new(Job {
                latest,
                cancel,
                worker: Mutex::new(Some(worker)),
            }),
        );
        tracing::debug!(problem = %id, "submitted");
        Ok(id)
    }

    /// Latest best snapshot of a problem.
    pub fn status(&self, id: ProblemId) -> Option<StatusReport> {
        let job = self.job(id)?;
        let report = job.latest.read().clone();
        Some(report)
    }

    /// Asks the worker to stop after its current move. False for unknown ids.
    pub fn cancel(&self, id: ProblemId) -> bool {
        match self.job(id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Blocks until the worker finishes and returns its final report.
    pub fn wait(&self, id: ProblemId) -> Option<StatusReport> {
        let job = self.job(id)?;
        job.join(id);
        let report = job.latest.read().clone();
        Some(report)
    }

    /// Cancels a problem, waits for its worker to stop and forgets it.
    pub fn remove(&self, id: ProblemId) -> bool {
        let Some(job) = self.jobs.write().remove(&id) else {
            return false;
        };
        job.cancel.cancel();
        job.join(id);
        true
    }

    pub fn problem_ids(&self) -> Vec<ProblemId> {
        let mut ids: Vec<ProblemId> = self.jobs.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn job(&self, id: ProblemId) -> Option<Arc<Job>> {
        self.jobs.read().get(&id).cloned()
    }
}

impl Job {
    /// Joins the worker. The guard is held across the join, so concurrent
    /// callers block until the first one has joined.
    fn join(&self, id: ProblemId) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::warn!(problem = %id, "worker panicked");
                self.latest.write().state = SolverState::Failed;
            }
        }
    }
}

impl Drop for DispatchService {
    fn drop(&mut self) {
        let jobs: Vec<(ProblemId, Arc<Job>)> = self.jobs.get_mut().drain().collect();
        for (_, job) in &jobs {
            job.cancel.cancel();
        }
        for (id, job) in jobs {
            job.join(id);
        }
    }
}
