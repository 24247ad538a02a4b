//! Concurrent extraction of tree metadata from many files.
//!
//! ## Architecture
//!
//! - [`pipeline`]: one sequential state machine per file, suspending only
//!   on reads and on decompression
//! - [`offload`]: a bounded pool for the CPU-bound decompression step
//! - [`batch`]: launches one pipeline task per request and gathers every
//!   outcome, success or failure, into a [`BatchResults`]
//!
//! Pipelines share nothing but the byte-range source and the
//! decompression pool. A failure ends only the pipeline that hit it.

mod batch;
mod offload;
mod pipeline;

pub use batch::{BatchResults, TreeRequest, scan_tree, scan_trees};
pub use offload::DecompressPool;
pub use pipeline::{Pipeline, PipelineState};

/// Bytes fetched by the first read of each file. Usually enough to cover
/// the file header, root key and root directory in one round trip.
pub const DEFAULT_READAHEAD: u32 = 512;

/// Upper bound on the default decompression worker count.
pub const DEFAULT_MAX_DECOMPRESS_WORKERS: usize = 4;

/// Tuning for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Length of the first read of each file.
    pub readahead: u32,
    /// Decompressions allowed to run at once, independent of how many
    /// files are in flight.
    pub decompress_workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            readahead: DEFAULT_READAHEAD,
            decompress_workers: default_decompress_workers(),
        }
    }
}

impl ScanOptions {
    /// Set the length of the first read of each file.
    ///
    /// # Arguments
    ///
    /// * `readahead` - Bytes to fetch at offset 0; a value too small to
    ///   cover the root directory costs extra, exactly sized reads
    pub fn with_readahead(mut self, readahead: u32) -> Self {
        self.readahead = readahead;
        self
    }

    /// Set how many decompressions may run at once.
    ///
    /// # Arguments
    ///
    /// * `workers` - Pool size; 0 is raised to 1
    pub fn with_decompress_workers(mut self, workers: usize) -> Self {
        self.decompress_workers = workers.max(1);
        self
    }
}

/// One less than the available cores, at least 1, at most
/// [`DEFAULT_MAX_DECOMPRESS_WORKERS`].
pub fn default_decompress_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get().saturating_sub(1).max(1))
        .unwrap_or(DEFAULT_MAX_DECOMPRESS_WORKERS)
        .min(DEFAULT_MAX_DECOMPRESS_WORKERS)
}
