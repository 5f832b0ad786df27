//! Result types produced by workers and assembled by the driver.
//!
//! A [`PartialResult`] belongs to exactly one worker. The worker fills it while walking its
//! chunk and hands it over once, by value (thread model) or as a serialized message
//! (process model). After the hand-off nothing mutates it.
//!
//! An [`AggregateResult`] belongs to the driver. Each received partial is merged into it
//! exactly once through [`AggregateResult::merge`]. Per-keyword file lists are filled in
//! completion order, which is nondeterministic, so consumers should compare them as sets
//! ([`AggregateResult::file_set`]).
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A single worker's locally accumulated findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    /// 1-based position of the worker's chunk in the partition
    pub worker_id: usize,
    /// Keyword -> files of this chunk containing it
    pub matches: BTreeMap<String, Vec<PathBuf>>,
    /// Files read and matched successfully
    pub files_processed: usize,
    /// Files that could not be read or decoded
    pub errors: usize,
    /// Set when the worker itself failed; the rest of the result is then empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl PartialResult {
    /// Creates an empty result for the given worker
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    /// The result reported in place of a worker that failed as a whole.
    /// It carries no matches, no processed files, and a single error.
    pub fn fatal(worker_id: usize, reason: impl Into<String>) -> Self {
        Self {
            worker_id,
            matches: BTreeMap::new(),
            files_processed: 0,
            errors: 1,
            fatal: Some(reason.into()),
        }
    }

    /// Whether the worker failed as a whole
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Records that `path` contains `keyword`
    pub fn record_match(&mut self, keyword: &str, path: &Path) {
        self.matches
            .entry(keyword.to_string())
            .or_default()
            .push(path.to_path_buf());
    }
}

/// Whether every spawned worker delivered its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionStatus {
    #[default]
    Complete,
    /// Collection stopped after a wait bound elapsed with `missing` results outstanding
    TimedOut { missing: usize },
}

/// The merged outcome of a scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Keyword -> matching files; every requested keyword is present
    pub matches: BTreeMap<String, Vec<PathBuf>>,
    /// Files the enumerator found
    pub files_discovered: usize,
    /// Files scanned successfully by workers that reported back
    pub files_processed: usize,
    /// Unreadable files plus failed workers
    pub errors: usize,
    /// Worker count asked for in the configuration
    pub workers_requested: usize,
    /// Workers actually started, i.e. non-empty chunks
    pub workers_spawned: usize,
    /// Workers whose result was merged
    pub workers_reported: usize,
    /// Workers that reported a fatal failure
    pub fatal_workers: usize,
    /// Worker processes killed after outliving the join deadline
    pub workers_terminated: usize,
    pub collection: CollectionStatus,
    /// Wall-clock duration of the scan
    pub elapsed: Duration,
}

impl AggregateResult {
    /// Creates an empty aggregate with an empty entry for each keyword
    pub fn new(keywords: &[String]) -> Self {
        Self {
            matches: keywords
                .iter()
                .map(|keyword| (keyword.clone(), Vec::new()))
                .collect(),
            ..Default::default()
        }
    }

    /// Merges one worker's partial result. Call exactly once per received result.
    pub fn merge(&mut self, partial: PartialResult) {
        for (keyword, files) in partial.matches {
            self.matches.entry(keyword).or_default().extend(files);
        }
        self.files_processed += partial.files_processed;
        self.errors += partial.errors;
        self.workers_reported += 1;
        if partial.fatal.is_some() {
            self.fatal_workers += 1;
        }
    }

    /// The files matching `keyword`, as a set
    pub fn file_set(&self, keyword: &str) -> BTreeSet<PathBuf> {
        self.matches
            .get(keyword)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keyword -> file set for every keyword, independent of merge order
    pub fn file_sets(&self) -> BTreeMap<String, BTreeSet<PathBuf>> {
        self.matches
            .iter()
            .map(|(keyword, files)| (keyword.clone(), files.iter().cloned().collect()))
            .collect()
    }

    /// Total keyword hits across all files
    pub fn total_matches(&self) -> usize {
        self.matches.values().map(Vec::len).sum()
    }

    /// Processed files per second of wall-clock time
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether collection stopped before every spawned worker reported
    pub fn is_partial(&self) -> bool {
        matches!(self.collection, CollectionStatus::TimedOut { .. })
    }
}
