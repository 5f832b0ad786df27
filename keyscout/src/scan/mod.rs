/// The parallel scanning engine.
///
/// A scan runs in five steps:
/// 1. the corpus is enumerated and sorted
/// 2. the file list is partitioned into exactly `worker_count` contiguous chunks
/// 3. one worker is started per non-empty chunk
/// 4. each worker scans its chunk file by file into a private [`PartialResult`]
/// 5. the partial results are merged into one [`AggregateResult`]
///
/// # Concurrency Models
///
/// Both models implement [`WorkerDispatch`] and produce the same keyword -> file sets for
/// the same input.
///
/// **Threads** ([`ThreadDispatch`]) run on a dedicated rayon pool in one address space.
/// Workers share the aggregate behind a single `Mutex` and take it once, after scanning:
/// ```rust,ignore
/// pool.scope(|scope| {
///     for assignment in &assignments {
///         scope.spawn(move |_| merge_locked(&shared, run_worker(&worker, assignment)));
///     }
/// });
/// ```
///
/// **Processes** ([`ProcessDispatch`]) run each worker as a child process with private
/// memory. Results travel back over a one-way channel with a bounded wait per message,
/// after which stragglers get a join deadline and are then killed:
/// ```rust,ignore
/// match rx.recv_timeout(collect_timeout) {
///     Ok(partial) => aggregate.merge(partial),
///     Err(_) => break, // proceed with a partial aggregate
/// }
/// fleet.reap(join_timeout);
/// ```
///
/// # Failure Handling
///
/// Per-file failures are counted inside the worker. A panic in a worker is caught at
/// its boundary and reported as a fatal partial result, and so is a worker process that
/// dies without answering. Neither stops the other workers.
///
/// [`PartialResult`]: crate::results::PartialResult
/// [`AggregateResult`]: crate::results::AggregateResult
pub mod engine;
pub mod matcher;
pub mod partition;
pub mod process;
pub mod threads;
pub mod worker;

pub use engine::{scan, scan_with, PhaseTracker, ScanPhase, WorkerDispatch};
pub use matcher::{matches, KeywordMatcher};
pub use partition::{assign, partition, Chunk, WorkerAssignment};
pub use process::ProcessDispatch;
pub use threads::ThreadDispatch;
pub use worker::{run_worker, scan_file, serve, ChunkWorker, KeywordHits, WorkerJob};
