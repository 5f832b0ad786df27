use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fs;
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::matcher::KeywordMatcher;
use super::partition::WorkerAssignment;
use crate::config::EncodingMode;
use crate::errors::{ScanError, ScanResult};
use crate::results::PartialResult;

/// Decodes file bytes into text according to the encoding mode
pub(crate) fn decode_bytes(bytes: &[u8], path: &Path, mode: EncodingMode) -> ScanResult<String> {
    match std::str::from_utf8(bytes) {
        Ok(valid) => Ok(valid.to_owned()),
        Err(e) => match mode {
            EncodingMode::FailFast => Err(ScanError::encoding(path, e)),
            EncodingMode::Ignore => {
                trace!("Dropping invalid UTF-8 in file: {}", path.display());
                Ok(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect())
            }
            EncodingMode::Lossy => {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        },
    }
}

/// Per-keyword presence for one file, in keyword order
pub type KeywordHits = Vec<bool>;

/// Reads one file and reports which keywords it contains
pub fn scan_file(path: &Path, matcher: &KeywordMatcher, mode: EncodingMode) -> ScanResult<KeywordHits> {
    trace!("Scanning file: {}", path.display());
    let bytes = fs::read(path).map_err(|e| ScanError::file_access(path, e))?;
    let content = decode_bytes(&bytes, path, mode)?;
    Ok(matcher.find_keywords(&content))
}

/// Scans the files of one chunk and accumulates a partial result
#[derive(Debug, Clone)]
pub struct ChunkWorker<'m> {
    matcher: &'m KeywordMatcher,
    encoding_mode: EncodingMode,
    progress_interval: usize,
}

impl<'m> ChunkWorker<'m> {
    pub fn new(matcher: &'m KeywordMatcher, encoding_mode: EncodingMode, progress_interval: usize) -> Self {
        Self {
            matcher,
            encoding_mode,
            progress_interval,
        }
    }

    /// Scans every file of the assignment in order. A file that cannot be read counts
    /// as one error, contributes no matches, and does not stop the chunk.
    pub fn scan(&self, assignment: &WorkerAssignment) -> PartialResult {
        let mut partial = PartialResult::new(assignment.worker_id);
        let total = assignment.files.len();

        for (index, path) in assignment.files.iter().enumerate() {
            match scan_file(path, self.matcher, self.encoding_mode) {
                Ok(found) => {
                    for (keyword, hit) in self.matcher.keywords().iter().zip(found) {
                        if hit {
                            partial.record_match(keyword, path);
                        }
                    }
                    partial.files_processed += 1;
                }
                Err(e) => {
                    warn!("Worker {}: {}", assignment.worker_id, e);
                    partial.errors += 1;
                }
            }

            let done = index + 1;
            if self.progress_interval > 0 && done % self.progress_interval == 0 {
                debug!(
                    "Worker {}: scanned {}/{} files",
                    assignment.worker_id, done, total
                );
            }
        }

        debug!(
            "Worker {}: finished, {} processed, {} errors",
            assignment.worker_id, partial.files_processed, partial.errors
        );
        partial
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a scan step at the worker boundary. A panic inside `step` becomes a fatal
/// partial result for `worker_id` instead of unwinding into the caller.
pub fn guarded<F>(worker_id: usize, step: F) -> PartialResult
where
    F: FnOnce() -> PartialResult,
{
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(partial) => partial,
        Err(payload) => {
            let err = ScanError::worker_failure(worker_id, panic_message(payload.as_ref()));
            warn!("{}", err);
            PartialResult::fatal(worker_id, err.to_string())
        }
    }
}

/// Scans an assignment behind the worker boundary
pub fn run_worker(worker: &ChunkWorker<'_>, assignment: &WorkerAssignment) -> PartialResult {
    guarded(assignment.worker_id, || worker.scan(assignment))
}

/// The job an isolated worker process receives on stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub worker_id: usize,
    pub keywords: Vec<String>,
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub encoding_mode: EncodingMode,
    #[serde(default = "crate::config::default_progress_interval")]
    pub progress_interval: usize,
}

impl WorkerJob {
    /// Splits the job into its keyword set and file assignment
    pub fn into_parts(self) -> (Vec<String>, WorkerAssignment) {
        let assignment = WorkerAssignment {
            worker_id: self.worker_id,
            files: self.files,
        };
        (self.keywords, assignment)
    }
}

/// Serves one isolated-worker job: reads a JSON [`WorkerJob`] from `reader` and writes
/// exactly one JSON [`PartialResult`] line to `writer`.
pub fn serve<R: BufRead, W: Write>(reader: R, mut writer: W) -> ScanResult<()> {
    let job: WorkerJob = serde_json::from_reader(reader)?;
    debug!(
        "Worker {}: received {} files",
        job.worker_id,
        job.files.len()
    );

    let (encoding_mode, progress_interval) = (job.encoding_mode, job.progress_interval);
    let (keywords, assignment) = job.into_parts();

    let partial = match KeywordMatcher::new(&keywords) {
        Ok(matcher) => {
            let worker = ChunkWorker::new(&matcher, encoding_mode, progress_interval);
            run_worker(&worker, &assignment)
        }
        Err(e) => PartialResult::fatal(assignment.worker_id, e.to_string()),
    };

    serde_json::to_writer(&mut writer, &partial)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
