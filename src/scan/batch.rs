use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BatchCancelled, ScanError};
use crate::io::ByteRangeSource;
use crate::root::TreeMetadata;

use super::ScanOptions;
use super::offload::DecompressPool;
use super::pipeline::Pipeline;

/// A file and the tree to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeRequest {
    pub path: String,
    /// Tree name, optionally `dir/sub/name` and/or `name;cycle`.
    pub tree: String,
}

impl TreeRequest {
    pub fn new(path: impl Into<String>, tree: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tree: tree.into(),
        }
    }
}

impl<P: Into<String>, T: Into<String>> From<(P, T)> for TreeRequest {
    fn from((path, tree): (P, T)) -> Self {
        Self::new(path, tree)
    }
}

/// Outcome of every file in a batch, keyed by path.
#[derive(Debug, Default)]
pub struct BatchResults {
    outcomes: BTreeMap<String, Result<TreeMetadata, ScanError>>,
}

impl BatchResults {
    /// Outcome recorded for `path`.
    ///
    /// # Returns
    ///
    /// `None` if `path` was not part of the batch, otherwise the file's
    /// metadata or the error that ended its pipeline.
    pub fn get(&self, path: &str) -> Option<&Result<TreeMetadata, ScanError>> {
        self.outcomes.get(path)
    }

    /// Entry count for `path`, if its pipeline succeeded.
    pub fn entries(&self, path: &str) -> Option<i64> {
        self.get(path)?.as_ref().ok().map(|meta| meta.entries)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<TreeMetadata, ScanError>)> {
        self.outcomes.iter().map(|(path, outcome)| (path.as_str(), outcome))
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &TreeMetadata)> {
        self.iter()
            .filter_map(|(path, outcome)| outcome.as_ref().ok().map(|meta| (path, meta)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScanError)> {
        self.iter()
            .filter_map(|(path, outcome)| outcome.as_ref().err().map(|err| (path, err)))
    }

    pub fn into_inner(self) -> BTreeMap<String, Result<TreeMetadata, ScanError>> {
        self.outcomes
    }
}

impl IntoIterator for BatchResults {
    type Item = (String, Result<TreeMetadata, ScanError>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Result<TreeMetadata, ScanError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Read tree metadata from many files concurrently.
///
/// # Arguments
///
/// * `source` - Byte-range source shared by every pipeline
/// * `requests` - `(path, tree)` pairs or [`TreeRequest`]s
/// * `options` - Readahead and decompression pool size
/// * `cancel` - Optional token that abandons the whole batch
///
/// # Returns
///
/// One outcome per distinct path, or [`BatchCancelled`] if `cancel` fired
/// before every pipeline finished.
///
/// Spawns one pipeline task per request; reads of different files
/// overlap freely, and decompression is bounded by
/// `options.decompress_workers`. Returns once every pipeline is
/// terminal, with one outcome per distinct path: a failing file never
/// affects the others. If a path appears more than once, only its first
/// request is run.
///
/// Cancelling `cancel` aborts every unfinished pipeline, waits for them to
/// be torn down, and returns [`BatchCancelled`] without partial results.
pub async fn scan_trees<R, I>(
    source: Arc<R>,
    requests: I,
    options: &ScanOptions,
    cancel: Option<CancellationToken>,
) -> Result<BatchResults, BatchCancelled>
where
    R: ByteRangeSource + ?Sized + 'static,
    I: IntoIterator,
    I::Item: Into<TreeRequest>,
{
    let cancel = cancel.unwrap_or_default();
    if cancel.is_cancelled() {
        return Err(BatchCancelled);
    }

    let pool = DecompressPool::new(options.decompress_workers);
    let mut seen = HashSet::new();
    let mut tasks = JoinSet::new();
    for request in requests {
        let request: TreeRequest = request.into();
        if !seen.insert(request.path.clone()) {
            warn!(
                path = %request.path,
                tree = %request.tree,
                "duplicate path in batch, keeping first request"
            );
            continue;
        }
        let pipeline = Pipeline::new(
            source.clone(),
            pool.clone(),
            request.path,
            request.tree,
            options,
        );
        tasks.spawn(async move {
            let path = pipeline.path().to_string();
            (path, pipeline.run().await)
        });
    }
    info!(files = tasks.len(), workers = pool.workers(), "scan batch started");

    let mut results = BatchResults::default();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                info!(finished = results.len(), "scan batch cancelled");
                return Err(BatchCancelled);
            }
            joined = tasks.join_next() => match joined {
                Some(Ok((path, outcome))) => {
                    if let Err(err) = &outcome {
                        debug!(path = %path, error = %err, "file failed");
                    }
                    results.outcomes.insert(path, outcome);
                }
                Some(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Some(Err(_)) => {}
                None => break,
            }
        }
    }

    info!(
        succeeded = results.successes().count(),
        failed = results.failures().count(),
        "scan batch finished"
    );
    Ok(results)
}

/// Read one tree from one file. Thin wrapper over the pipeline used by
/// [`scan_trees`].
///
/// # Arguments
///
/// * `source` - Byte-range source serving `path`
/// * `path` - Path or URL of the file
/// * `tree` - Tree name, optionally `dir/name` and/or `name;cycle`
/// * `options` - Readahead and decompression pool size
///
/// # Returns
///
/// The tree's metadata, or the error that ended the pipeline.
pub async fn scan_tree<R>(
    source: Arc<R>,
    path: &str,
    tree: &str,
    options: &ScanOptions,
) -> Result<TreeMetadata, ScanError>
where
    R: ByteRangeSource + ?Sized,
{
    let pool = DecompressPool::new(options.decompress_workers);
    Pipeline::new(source, pool, path, tree, options).run().await
}
