use std::time::{Duration, Instant};
use tracing::info;

use crate::results::AggregateResult;

/// Measures the wall-clock duration of a scan
#[derive(Debug, Clone, Copy)]
pub struct RunTimer {
    started: Instant,
}

impl RunTimer {
    /// Starts timing now
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Timing and throughput of a finished scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanStats {
    pub elapsed: Duration,
    pub files_discovered: usize,
    pub files_processed: usize,
    pub errors: usize,
    pub files_per_second: f64,
}

impl ScanStats {
    pub fn from_result(result: &AggregateResult) -> Self {
        Self {
            elapsed: result.elapsed,
            files_discovered: result.files_discovered,
            files_processed: result.files_processed,
            errors: result.errors,
            files_per_second: result.files_per_second(),
        }
    }

    /// Logs the run statistics
    pub fn log_stats(&self) {
        info!(
            "Scan stats:\n\
             Elapsed: {:.3}s\n\
             Files processed/discovered: {}/{}\n\
             Errors: {}\n\
             Throughput: {:.1} files/s",
            self.elapsed.as_secs_f64(),
            self.files_processed,
            self.files_discovered,
            self.errors,
            self.files_per_second
        );
    }
}
