use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::engine::{PhaseTracker, ScanPhase, WorkerDispatch};
use super::matcher::KeywordMatcher;
use super::partition::WorkerAssignment;
use super::worker::WorkerJob;
use crate::config::{EncodingMode, ScanConfig, WorkerCommand};
use crate::errors::{ScanError, ScanResult};
use crate::results::{AggregateResult, CollectionStatus, PartialResult};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawned worker processes. Any child still held when the fleet is dropped is killed,
/// so no exit path from the driver leaves a worker running.
#[derive(Debug, Default)]
struct WorkerFleet {
    children: Vec<(usize, Child)>,
}

impl WorkerFleet {
    fn push(&mut self, worker_id: usize, child: Child) {
        self.children.push((worker_id, child));
    }

    fn len(&self) -> usize {
        self.children.len()
    }

    /// Waits for every child until a shared deadline, then kills the survivors.
    /// Returns how many had to be killed.
    fn reap(&mut self, join_timeout: Duration) -> usize {
        let deadline = Instant::now() + join_timeout;
        let mut terminated = 0;

        for (worker_id, mut child) in self.children.drain(..) {
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        if !status.success() {
                            debug!("Worker {} exited with {}", worker_id, status);
                        }
                        break;
                    }
                    Ok(None) if Instant::now() < deadline => thread::sleep(JOIN_POLL_INTERVAL),
                    Ok(None) => {
                        warn!(
                            "Worker {} still running after {:?}, terminating",
                            worker_id, join_timeout
                        );
                        terminate(worker_id, &mut child);
                        terminated += 1;
                        break;
                    }
                    Err(e) => {
                        warn!("Cannot poll worker {}: {}", worker_id, e);
                        terminate(worker_id, &mut child);
                        break;
                    }
                }
            }
        }
        terminated
    }
}

impl Drop for WorkerFleet {
    fn drop(&mut self) {
        for (worker_id, child) in self.children.iter_mut() {
            if let Ok(None) = child.try_wait() {
                terminate(*worker_id, child);
            }
        }
    }
}

fn terminate(worker_id: usize, child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Kill of worker {} failed: {}", worker_id, e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap worker {}: {}", worker_id, e);
    }
}

/// Writes the job to the worker and reads back its single result line
fn exchange(
    job: &WorkerJob,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
) -> ScanResult<PartialResult> {
    let worker_id = job.worker_id;
    let mut stdin =
        stdin.ok_or_else(|| ScanError::worker_failure(worker_id, "stdin was not captured"))?;
    let stdout =
        stdout.ok_or_else(|| ScanError::worker_failure(worker_id, "stdout was not captured"))?;

    serde_json::to_writer(&mut stdin, job)?;
    stdin.flush()?;
    drop(stdin);

    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line)?;
    if line.trim().is_empty() {
        return Err(ScanError::worker_failure(
            worker_id,
            "exited without reporting a result",
        ));
    }

    let partial: PartialResult = serde_json::from_str(line.trim())?;
    if partial.worker_id != worker_id {
        return Err(ScanError::worker_failure(
            worker_id,
            format!("reported as worker {}", partial.worker_id),
        ));
    }
    Ok(partial)
}

/// Feeds one worker and forwards its result, or a fatal stand-in, to the channel
fn relay(job: WorkerJob, stdin: Option<ChildStdin>, stdout: Option<ChildStdout>, tx: Sender<PartialResult>) {
    let worker_id = job.worker_id;
    let partial = exchange(&job, stdin, stdout).unwrap_or_else(|e| {
        warn!("{}", e);
        PartialResult::fatal(worker_id, e.to_string())
    });
    // The driver may have stopped listening after a timeout
    let _ = tx.send(partial);
}

/// Isolated-memory model: one child process per assignment.
///
/// Each child receives its job as JSON on stdin and answers with exactly one JSON
/// [`PartialResult`] line on stdout. A relay thread per child forwards that answer into a
/// one-way channel. The driver waits at most `collect_timeout` for each message and
/// stops collecting at the first miss. Every child then gets until `join_timeout` to
/// exit before it is killed.
#[derive(Debug, Clone)]
pub struct ProcessDispatch {
    command: WorkerCommand,
    collect_timeout: Duration,
    join_timeout: Duration,
    encoding_mode: EncodingMode,
    progress_interval: usize,
}

impl ProcessDispatch {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            collect_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            encoding_mode: EncodingMode::default(),
            progress_interval: 5,
        }
    }

    /// Builds the dispatcher from the configured worker command, which must be set
    pub fn from_config(config: &ScanConfig) -> ScanResult<Self> {
        let command = config.worker_command.clone().ok_or_else(|| {
            ScanError::invalid_configuration("processes model requires worker_command")
        })?;
        Ok(Self::new(command)
            .collect_timeout(config.collect_timeout)
            .join_timeout(config.join_timeout)
            .encoding_mode(config.encoding_mode)
            .progress_interval(config.progress_interval))
    }

    pub fn collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn encoding_mode(mut self, mode: EncodingMode) -> Self {
        self.encoding_mode = mode;
        self
    }

    pub fn progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    fn spawn_worker(
        &self,
        assignment: WorkerAssignment,
        keywords: &[String],
        tx: &Sender<PartialResult>,
        fleet: &mut WorkerFleet,
    ) {
        let worker_id = assignment.worker_id;
        let spawned = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = ScanError::worker_failure(
                    worker_id,
                    format!("cannot start {}: {}", self.command.program.display(), e),
                );
                warn!("{}", err);
                let _ = tx.send(PartialResult::fatal(worker_id, err.to_string()));
                return;
            }
        };
        debug!("Worker {} started as pid {}", worker_id, child.id());

        let job = WorkerJob {
            worker_id,
            keywords: keywords.to_vec(),
            files: assignment.files,
            encoding_mode: self.encoding_mode,
            progress_interval: self.progress_interval,
        };
        let (stdin, stdout) = (child.stdin.take(), child.stdout.take());
        fleet.push(worker_id, child);

        let relay_tx = tx.clone();
        let relayed = thread::Builder::new()
            .name(format!("keyscout-relay-{}", worker_id))
            .spawn(move || relay(job, stdin, stdout, relay_tx));
        if let Err(e) = relayed {
            let err = ScanError::worker_failure(worker_id, format!("cannot start relay: {}", e));
            warn!("{}", err);
            let _ = tx.send(PartialResult::fatal(worker_id, err.to_string()));
        }
    }
}

impl WorkerDispatch for ProcessDispatch {
    fn dispatch(
        &self,
        assignments: Vec<WorkerAssignment>,
        matcher: &KeywordMatcher,
        mut aggregate: AggregateResult,
        phase: &mut PhaseTracker,
    ) -> ScanResult<AggregateResult> {
        let expected = assignments.len();
        let (tx, rx) = mpsc::channel();
        let mut fleet = WorkerFleet::default();

        for assignment in assignments {
            self.spawn_worker(assignment, matcher.keywords(), &tx, &mut fleet);
        }
        drop(tx);
        info!("Started {} of {} worker processes", fleet.len(), expected);
        phase.advance(ScanPhase::Awaiting);

        let mut received = 0;
        while received < expected {
            match rx.recv_timeout(self.collect_timeout) {
                Ok(partial) => {
                    debug!("Received result from worker {}", partial.worker_id);
                    aggregate.merge(partial);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "No worker result within {:?}; continuing with {} of {} results",
                        self.collect_timeout, received, expected
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(
                        "Result channel closed with {} of {} results",
                        received, expected
                    );
                    break;
                }
            }
        }
        drop(rx);

        if received < expected {
            aggregate.collection = CollectionStatus::TimedOut {
                missing: expected - received,
            };
            phase.advance(ScanPhase::Aborted);
        }

        aggregate.workers_terminated = fleet.reap(self.join_timeout);
        Ok(aggregate)
    }
}
