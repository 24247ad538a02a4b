//! # rootscan
//!
//! Concurrent extraction of tree entry counts from ROOT files over
//! byte-range reads.
//!
//! Reaching a tree's entry count takes a short chain of dependent reads:
//! the file header, the top directory's key list, then the tree's record,
//! which is usually compressed. This crate runs that chain for many files
//! at once so that network waits overlap, while decompression runs on a
//! bounded worker pool.
//!
//! ## Features
//!
//! - Sans-I/O decoder for the ROOT records on the path to a tree
//! - Local files, HTTP/HTTPS Range requests, or any [`ByteRangeSource`]
//! - zlib, zstd and LZ4 (checksummed) payloads, including multi-block records
//! - Per-file failure isolation and whole-batch cancellation
//! - Trees in subdirectories (`dir/Events`) and explicit cycles (`Events;2`)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rootscan::{HttpRangeSource, ScanOptions, TreeRequest, scan_trees};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(HttpRangeSource::new(Duration::from_secs(60))?);
//!     let requests = vec![
//!         TreeRequest::new("https://example.com/a.root", "Events"),
//!         TreeRequest::new("https://example.com/b.root", "Events"),
//!     ];
//!
//!     let results = scan_trees(source, requests, &ScanOptions::default(), None).await?;
//!     for (path, outcome) in results.iter() {
//!         match outcome {
//!             Ok(meta) => println!("{path}: {} entries", meta.entries),
//!             Err(err) => println!("{path}: {err}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod root;
pub mod scan;

pub use cli::Cli;
pub use error::{BatchCancelled, ParseError, ScanError};
pub use io::{ByteRange, ByteRangeSource, HttpRangeSource, LocalFileSource, MemorySource};
pub use root::{DirectoryEntry, RawRecordHeader, TreeMetadata};
pub use scan::{BatchResults, DecompressPool, ScanOptions, TreeRequest, scan_tree, scan_trees};
