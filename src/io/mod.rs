mod http;
mod local;
mod memory;

pub use http::HttpRangeSource;
pub use local::LocalFileSource;
pub use memory::MemorySource;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// A byte range to read: `length` bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u32,
}

impl ByteRange {
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

/// Trait for byte-range reads from files named by path or URL
#[async_trait]
pub trait ByteRangeSource: Send + Sync {
    /// Read `range` of the file at `path`.
    ///
    /// Returns fewer than `range.length` bytes only when the range runs
    /// past the end of the file. Implementations must allow many
    /// concurrent calls against the same or different paths.
    async fn read(&self, path: &str, range: ByteRange) -> Result<Bytes>;
}
