use rayon::ThreadPoolBuilder;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::engine::{PhaseTracker, ScanPhase, WorkerDispatch};
use super::matcher::KeywordMatcher;
use super::partition::WorkerAssignment;
use super::worker::{run_worker, ChunkWorker};
use crate::config::{EncodingMode, ScanConfig};
use crate::errors::{ScanError, ScanResult};
use crate::results::{AggregateResult, PartialResult};

/// Shared-memory model: one pool thread per assignment, all merging into a single
/// lock-guarded aggregate.
///
/// A worker takes the lock exactly once, after its whole chunk is scanned, so file I/O
/// never happens under the lock. Merge order follows completion order. Threads cannot be
/// cancelled; the driver waits for all of them without a timeout.
#[derive(Debug, Clone)]
pub struct ThreadDispatch {
    encoding_mode: EncodingMode,
    progress_interval: usize,
}

impl ThreadDispatch {
    pub fn new(encoding_mode: EncodingMode, progress_interval: usize) -> Self {
        Self {
            encoding_mode,
            progress_interval,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.encoding_mode, config.progress_interval)
    }
}

/// Folds one partial result into the shared aggregate under the lock
fn merge_locked(shared: &Mutex<AggregateResult>, partial: PartialResult) {
    let worker_id = partial.worker_id;
    let mut aggregate = shared.lock().unwrap_or_else(PoisonError::into_inner);
    aggregate.merge(partial);
    debug!(
        "Worker {} merged ({} of {} reported)",
        worker_id, aggregate.workers_reported, aggregate.workers_spawned
    );
}

impl WorkerDispatch for ThreadDispatch {
    fn dispatch(
        &self,
        assignments: Vec<WorkerAssignment>,
        matcher: &KeywordMatcher,
        aggregate: AggregateResult,
        phase: &mut PhaseTracker,
    ) -> ScanResult<AggregateResult> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(assignments.len().max(1))
            .thread_name(|index| format!("keyscout-worker-{}", index + 1))
            .build()
            .map_err(|e| ScanError::worker_spawn(e.to_string()))?;

        info!("Running {} worker threads", assignments.len());
        let shared = Mutex::new(aggregate);
        let worker = ChunkWorker::new(matcher, self.encoding_mode, self.progress_interval);

        pool.scope(|scope| {
            for assignment in &assignments {
                let shared = &shared;
                let worker = &worker;
                scope.spawn(move |_| {
                    let partial = run_worker(worker, assignment);
                    merge_locked(shared, partial);
                });
            }
            phase.advance(ScanPhase::Awaiting);
        });

        Ok(shared.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
