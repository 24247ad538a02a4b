use super::{ByteRange, ByteRangeSource};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory source with optional per-read latency.
///
/// Records every read it serves, and counts reads still waiting on their
/// latency, so callers can check which ranges were requested and that
/// nothing is left in flight.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<String, Bytes>,
    latency: Option<Duration>,
    reads: Mutex<Vec<(String, ByteRange)>>,
    in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.insert(path.into(), data.into());
        self
    }

    /// Delay every read by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reads served or started so far, in arrival order
    pub fn reads(&self) -> Vec<(String, ByteRange)> {
        self.reads.lock().clone()
    }

    pub fn reads_for(&self, path: &str) -> Vec<ByteRange> {
        self.reads
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, r)| *r)
            .collect()
    }

    /// Reads started but not yet answered or abandoned
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count when a read finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ByteRangeSource for MemorySource {
    async fn read(&self, path: &str, range: ByteRange) -> Result<Bytes> {
        self.reads.lock().push((path.to_string(), range));
        let _guard = InFlight::enter(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let data = self
            .files
            .get(path)
            .ok_or_else(|| anyhow!("no such file: {}", path))?;
        let len = data.len() as u64;
        if range.offset > len {
            return Err(anyhow!("offset {} past end of {} ({} bytes)", range.offset, path, len));
        }
        let end = range.end().min(len);
        Ok(data.slice(range.offset as usize..end as usize))
    }
}
