//! Error types shared by the decoder and the scan pipeline.

use thiserror::Error;

/// Bytes did not match the expected record layout.
///
/// Carries enough context to locate the problem: which record was being
/// decoded, the offset inside the buffer handed to the decoder, and what
/// was expected versus what was found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed {record} at offset {offset}: expected {expected}, found {found}")]
pub struct ParseError {
    pub record: &'static str,
    pub offset: usize,
    pub expected: String,
    pub found: String,
}

impl ParseError {
    pub fn new(
        record: &'static str,
        offset: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self {
            record,
            offset,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Terminal failure of one file's pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Transport failure or timeout on a read.
    #[error("read of {length} bytes at offset {offset} failed: {message}")]
    Io {
        offset: u64,
        length: u32,
        message: String,
    },

    /// Bytes do not match the expected layout, including out-of-bounds
    /// offsets and lengths.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Requested tree name is absent from the directory.
    #[error("no key named {name:?} in directory")]
    NotFound { name: String },

    /// Compression algorithm tag is unknown or has no decoder.
    #[error("unsupported compression algorithm {tag:?}")]
    UnsupportedCompression { tag: String },

    /// Corrupt compressed stream or length mismatch.
    #[error("decompression failed: {message}")]
    Decompression { message: String },
}

impl ScanError {
    pub fn decompression(message: impl Into<String>) -> Self {
        Self::Decompression {
            message: message.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

/// The batch was cancelled before every pipeline reached a terminal state.
///
/// Cancellation is whole-batch: results of pipelines that had already
/// finished are discarded along with the rest.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("scan batch cancelled")]
pub struct BatchCancelled;
