use tracing::{debug, info};

use super::matcher::KeywordMatcher;
use super::partition::{assign, partition, WorkerAssignment};
use super::process::ProcessDispatch;
use super::threads::ThreadDispatch;
use crate::config::{ConcurrencyModel, ScanConfig};
use crate::corpus::enumerate_files;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::{RunTimer, ScanStats};
use crate::results::AggregateResult;

/// Stages of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Dispatching,
    Awaiting,
    /// Collection gave up before every worker reported
    Aborted,
    Finalizing,
    Done,
}

impl ScanPhase {
    pub fn can_advance_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Idle, Dispatching)
                | (Idle, Done)
                | (Dispatching, Awaiting)
                | (Awaiting, Aborted)
                | (Awaiting, Finalizing)
                | (Aborted, Finalizing)
                | (Finalizing, Done)
        )
    }
}

/// Records the phases a scan passes through
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    history: Vec<ScanPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            history: vec![ScanPhase::Idle],
        }
    }

    pub fn current(&self) -> ScanPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(ScanPhase::Idle)
    }

    pub fn history(&self) -> &[ScanPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: ScanPhase) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "illegal scan phase transition {:?} -> {:?}",
            current,
            next
        );
        debug!("Scan phase {:?} -> {:?}", current, next);
        self.history.push(next);
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A concurrency model: runs one worker per assignment and merges what comes back.
///
/// Implementations advance `phase` to `Awaiting` once every worker is started, and to
/// `Aborted` if they stop collecting before every worker reported.
pub trait WorkerDispatch {
    fn dispatch(
        &self,
        assignments: Vec<WorkerAssignment>,
        matcher: &KeywordMatcher,
        aggregate: AggregateResult,
        phase: &mut PhaseTracker,
    ) -> ScanResult<AggregateResult>;
}

/// Scans the configured directory using the configured concurrency model
pub fn scan(config: &ScanConfig) -> ScanResult<AggregateResult> {
    let timer = RunTimer::start();
    check_entry(config)?;
    match config.model {
        ConcurrencyModel::Threads => run(config, &ThreadDispatch::from_config(config), timer),
        ConcurrencyModel::Processes => {
            run(config, &ProcessDispatch::from_config(config)?, timer)
        }
    }
}

/// Scans the configured directory, running workers through `dispatcher`.
///
/// Configuration and directory problems are reported before any worker exists. An
/// empty corpus returns an empty result without dispatching.
pub fn scan_with(config: &ScanConfig, dispatcher: &dyn WorkerDispatch) -> ScanResult<AggregateResult> {
    let timer = RunTimer::start();
    check_entry(config)?;
    run(config, dispatcher, timer)
}

/// Fatal checks that must pass before anything is enumerated or dispatched
fn check_entry(config: &ScanConfig) -> ScanResult<()> {
    config.validate()?;
    if !config.root_path.is_dir() {
        return Err(ScanError::directory_not_found(&config.root_path));
    }
    Ok(())
}

fn run(config: &ScanConfig, dispatcher: &dyn WorkerDispatch, timer: RunTimer) -> ScanResult<AggregateResult> {
    let mut phase = PhaseTracker::new();
    info!(
        "Starting scan of {} for keywords: {:?}",
        config.root_path.display(),
        config.keywords
    );

    let files = enumerate_files(&config.root_path, &config.file_pattern, config.recursive)?;
    let mut aggregate = AggregateResult::new(&config.keywords);
    aggregate.workers_requested = config.worker_count;
    aggregate.files_discovered = files.len();

    if files.is_empty() {
        info!(
            "No files matching '{}' in {}",
            config.file_pattern,
            config.root_path.display()
        );
        phase.advance(ScanPhase::Done);
        aggregate.elapsed = timer.elapsed();
        return Ok(aggregate);
    }

    phase.advance(ScanPhase::Dispatching);
    let matcher = KeywordMatcher::new(&config.keywords)?;
    let chunks = partition(&files, config.worker_count)?;
    let assignments = assign(&chunks);
    aggregate.workers_spawned = assignments.len();
    info!(
        "Dispatching {} files to {} of {} requested workers ({:?} model)",
        files.len(),
        assignments.len(),
        config.worker_count,
        config.model
    );

    let mut aggregate = dispatcher.dispatch(assignments, &matcher, aggregate, &mut phase)?;

    phase.advance(ScanPhase::Finalizing);
    aggregate.elapsed = timer.elapsed();
    ScanStats::from_result(&aggregate).log_stats();
    info!(
        "Scan complete. {} keyword hits across {} processed files",
        aggregate.total_matches(),
        aggregate.files_processed
    );
    phase.advance(ScanPhase::Done);

    Ok(aggregate)
}
