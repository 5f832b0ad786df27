use std::path::PathBuf;
use tracing::debug;

use crate::errors::{ScanError, ScanResult};

/// A contiguous slice of the file list
pub type Chunk<'a> = &'a [PathBuf];

/// A non-empty chunk paired with the worker that will scan it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    /// 1-based position of the chunk in the partition
    pub worker_id: usize,
    pub files: Vec<PathBuf>,
}

/// Splits `files` into exactly `worker_count` contiguous, disjoint chunks.
///
/// With `N` files and `W` workers the first `N % W` chunks hold `N / W + 1` files and
/// the rest hold `N / W`, preserving order. Trailing chunks are empty when `N < W`.
pub fn partition(files: &[PathBuf], worker_count: usize) -> ScanResult<Vec<Chunk<'_>>> {
    if worker_count == 0 {
        return Err(ScanError::invalid_configuration(
            "worker count must be at least 1",
        ));
    }

    let base = files.len() / worker_count;
    let remainder = files.len() % worker_count;

    let mut chunks = Vec::with_capacity(worker_count);
    let mut start = 0;
    for index in 0..worker_count {
        let len = base + usize::from(index < remainder);
        chunks.push(&files[start..start + len]);
        start += len;
    }

    debug!(
        "Partitioned {} files into {} chunks (base size {}, {} enlarged)",
        files.len(),
        worker_count,
        base,
        remainder
    );
    Ok(chunks)
}

/// Keeps the non-empty chunks and numbers them by their position in the partition.
/// The number of assignments is the scan's effective parallelism.
pub fn assign(chunks: &[Chunk<'_>]) -> Vec<WorkerAssignment> {
    chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| !chunk.is_empty())
        .map(|(index, chunk)| WorkerAssignment {
            worker_id: index + 1,
            files: chunk.to_vec(),
        })
        .collect()
}
