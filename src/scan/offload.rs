use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::ScanError;
use crate::root::{CompressedBlock, decompress_payload};

/// Bounded pool for decompression.
///
/// At most `workers` decompressions run at once on the blocking thread
/// pool; further requests wait for a permit. The semaphore is fair, so
/// waiters are served in arrival order. Clones share the same capacity.
#[derive(Debug, Clone)]
pub struct DecompressPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl DecompressPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not currently decompressing.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Decompress `blocks` into a fresh buffer of `expected_len` bytes.
    ///
    /// Takes ownership of the blocks for the duration of the call. If the
    /// caller is dropped while waiting for a permit, nothing is submitted;
    /// once submitted, the work runs to completion and keeps its permit
    /// until it does, even if the result is discarded.
    pub async fn decompress(
        &self,
        blocks: Vec<CompressedBlock>,
        expected_len: usize,
    ) -> Result<Bytes, ScanError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScanError::decompression("decompression pool closed"))?;

        debug!(blocks = blocks.len(), expected_len, "decompression submitted");
        let data = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            decompress_payload(&blocks, expected_len)
        })
        .await
        .map_err(|e| ScanError::decompression(format!("decompression worker failed: {e}")))??;

        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::CompressionAlgorithm;

    fn zstd_block(raw: &[u8]) -> CompressedBlock {
        CompressedBlock {
            algorithm: CompressionAlgorithm::Zstd,
            data: Bytes::from(zstd::bulk::compress(raw, 1).unwrap()),
            uncompressed_len: raw.len() as u32,
            checksum: None,
        }
    }

    #[test]
    fn at_least_one_worker() {
        assert_eq!(DecompressPool::new(0).workers(), 1);
    }

    #[tokio::test]
    async fn requests_beyond_capacity_queue_and_complete() {
        let pool = DecompressPool::new(2);
        let raw: Vec<u8> = (0..10_000u32).map(|i| (i % 97) as u8).collect();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let blocks = vec![zstd_block(&raw)];
            let len = raw.len();
            handles.push(tokio::spawn(async move { pool.decompress(blocks, len).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_ref(), raw.as_slice());
        }
        assert_eq!(pool.idle_workers(), 2);
    }

    #[tokio::test]
    async fn failure_releases_worker() {
        let pool = DecompressPool::new(1);
        let mut block = zstd_block(b"payload");
        block.data = Bytes::from_static(b"not zstd");

        let err = pool.decompress(vec![block], 7).await.unwrap_err();
        assert!(matches!(err, ScanError::Decompression { .. }));
        assert_eq!(pool.idle_workers(), 1);
    }
}
