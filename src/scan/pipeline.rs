//! Per-file state machine.
//!
//! Each step derives its read from the previous step's decoded output,
//! so steps within one file are strictly sequential:
//!
//! ```text
//! Init -> HeaderFetched -> DirectoryFetched -> KeyLocated -> PayloadFetched
//!                                ^                 |                |
//!                                +-- subdirectory -+                v
//!                                                  Parsed <- Decompressed
//! ```
//!
//! Any step may end in `Failed`. Terminal states issue no further reads.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ParseError, ScanError};
use crate::io::{ByteRange, ByteRangeSource};
use crate::root::*;

use super::ScanOptions;
use super::offload::DecompressPool;

/// Where a file's pipeline stands. Each state owns the data the next
/// step needs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Init,
    HeaderFetched {
        header: FileHeader,
        root: RootDirectory,
    },
    /// `directory.sub_entries` holds the listing to search for the name
    /// segment at `depth`.
    DirectoryFetched {
        file_size: u64,
        directory: DirectoryEntry,
        depth: usize,
    },
    KeyLocated {
        file_size: u64,
        entry: DirectoryEntry,
        depth: usize,
    },
    PayloadFetched {
        key: RawRecordHeader,
        record: Bytes,
    },
    Decompressed {
        data: Bytes,
    },
    Parsed(TreeMetadata),
    Failed(ScanError),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::HeaderFetched { .. } => "header-fetched",
            Self::DirectoryFetched { .. } => "directory-fetched",
            Self::KeyLocated { .. } => "key-located",
            Self::PayloadFetched { .. } => "payload-fetched",
            Self::Decompressed { .. } => "decompressed",
            Self::Parsed(_) => "parsed",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Parsed(_) | Self::Failed(_))
    }
}

/// Reads one tree's metadata out of one file.
pub struct Pipeline<R: ?Sized> {
    source: Arc<R>,
    pool: DecompressPool,
    path: String,
    tree: String,
    /// `tree` split on `/`: subdirectories, then the tree name.
    segments: Vec<String>,
    readahead: u32,
}

impl<R: ByteRangeSource + ?Sized> Pipeline<R> {
    /// Create a pipeline for one file, positioned before its first read.
    ///
    /// # Arguments
    ///
    /// * `source` - Shared byte-range source serving `path`
    /// * `pool` - Decompression pool shared with the other pipelines
    /// * `path` - Path or URL handed to the source on every read
    /// * `tree` - Tree name, optionally `dir/sub/name` and/or `name;cycle`
    /// * `options` - Scan tuning; only the readahead is used here
    pub fn new(
        source: Arc<R>,
        pool: DecompressPool,
        path: impl Into<String>,
        tree: impl Into<String>,
        options: &ScanOptions,
    ) -> Self {
        let tree = tree.into();
        let segments = tree
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            source,
            pool,
            path: path.into(),
            tree,
            segments,
            readahead: options.readahead,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Drive the state machine from `Init` to a terminal state.
    pub async fn run(self) -> Result<TreeMetadata, ScanError> {
        let mut state = PipelineState::Init;
        loop {
            state = match self.step(state).await {
                PipelineState::Parsed(meta) => return Ok(meta),
                PipelineState::Failed(err) => return Err(err),
                next => next,
            };
        }
    }

    /// Advance one state. Terminal states are returned unchanged.
    pub async fn step(&self, state: PipelineState) -> PipelineState {
        let from = state.name();
        let next = match state {
            PipelineState::Init => self.fetch_header().await,
            PipelineState::HeaderFetched { header, root } => {
                self.fetch_directory(&header, &root).await
            }
            PipelineState::DirectoryFetched {
                file_size,
                directory,
                depth,
            } => self.locate_key(file_size, &directory, depth),
            PipelineState::KeyLocated {
                file_size,
                entry,
                depth,
            } => self.fetch_record(file_size, entry, depth).await,
            PipelineState::PayloadFetched { key, record } => self.expand(&key, record).await,
            PipelineState::Decompressed { data } => decode_tree_metadata(&data)
                .map(PipelineState::Parsed)
                .map_err(ScanError::from),
            terminal @ (PipelineState::Parsed(_) | PipelineState::Failed(_)) => return terminal,
        };

        let next = next.unwrap_or_else(PipelineState::Failed);
        match &next {
            PipelineState::Failed(err) => {
                debug!(path = %self.path, from, error = %err, "pipeline failed")
            }
            _ => debug!(path = %self.path, from, to = next.name(), "pipeline step"),
        }
        next
    }

    async fn read(&self, range: ByteRange) -> Result<Bytes, ScanError> {
        debug!(path = %self.path, %range, "read");
        self.source
            .read(&self.path, range)
            .await
            .map_err(|e| ScanError::Io {
                offset: range.offset,
                length: range.length,
                message: format!("{e:#}"),
            })
    }

    /// Decode `record` from `buf` (file bytes from offset 0), reading
    /// exactly the reported shortfall whenever the decoder needs more.
    /// Once the file size is known, follow-up reads must end within it.
    async fn read_until<T>(
        &self,
        buf: &mut Vec<u8>,
        record: &'static str,
        file_size: Option<u64>,
        mut decode: impl FnMut(&[u8]) -> DecodeResult<T>,
    ) -> Result<T, ScanError> {
        loop {
            let more = match decode(buf.as_slice())? {
                Decoded::Complete(value) => return Ok(value),
                Decoded::NeedMore(more) => more,
            };
            warn!(
                path = %self.path,
                record,
                have = buf.len(),
                more,
                "readahead too short, fetching more"
            );
            let length = u32::try_from(more).map_err(|_| {
                ParseError::new(record, buf.len(), "readable range", format!("{more} more bytes"))
            })?;
            let range = match file_size {
                Some(file_size) => checked_range(record, buf.len() as u64, length, file_size)?,
                None => ByteRange::new(buf.len() as u64, length),
            };
            let chunk = self.read(range).await?;
            if chunk.is_empty() {
                return Err(ParseError::new(
                    record,
                    buf.len(),
                    format!("{more} more bytes"),
                    "end of file",
                )
                .into());
            }
            buf.extend_from_slice(&chunk);
        }
    }

    async fn fetch_header(&self) -> Result<PipelineState, ScanError> {
        let mut buf = self.read(ByteRange::new(0, self.readahead)).await?.to_vec();
        let header = self
            .read_until(&mut buf, "file header", None, decode_file_header)
            .await?;
        let root = self
            .read_until(&mut buf, "root directory", Some(header.end), |bytes| {
                decode_root_directory(bytes, &header)
            })
            .await?;
        Ok(PipelineState::HeaderFetched { header, root })
    }

    async fn fetch_directory(
        &self,
        header: &FileHeader,
        root: &RootDirectory,
    ) -> Result<PipelineState, ScanError> {
        let mut directory = root.to_entry();
        directory.sub_entries = self
            .fetch_key_list(&root.record, header.end)
            .await?;
        Ok(PipelineState::DirectoryFetched {
            file_size: header.end,
            directory,
            depth: 0,
        })
    }

    async fn fetch_key_list(
        &self,
        record: &DirectoryRecord,
        file_size: u64,
    ) -> Result<Vec<DirectoryEntry>, ScanError> {
        let range = checked_range("key list", record.seek_keys, record.nbytes_keys, file_size)?;
        let bytes = self.read(range).await?;
        let entries = decode_directory(&bytes, file_size)?
            .complete_or_truncated("key list", bytes.len())?;
        if entries.is_empty() {
            return Err(ScanError::not_found(&self.tree));
        }
        Ok(entries)
    }

    fn locate_key(
        &self,
        file_size: u64,
        directory: &DirectoryEntry,
        depth: usize,
    ) -> Result<PipelineState, ScanError> {
        let segment = self
            .segments
            .get(depth)
            .ok_or_else(|| ScanError::not_found(&self.tree))?;
        let entry = directory
            .find(segment)
            .ok_or_else(|| ScanError::not_found(&self.tree))?;
        Ok(PipelineState::KeyLocated {
            file_size,
            entry: entry.clone(),
            depth,
        })
    }

    /// Fetch the located key's whole record (key plus payload) in one read.
    /// An intermediate name segment descends into a subdirectory instead.
    async fn fetch_record(
        &self,
        file_size: u64,
        mut entry: DirectoryEntry,
        depth: usize,
    ) -> Result<PipelineState, ScanError> {
        let range = checked_range("key", entry.record_offset, entry.record_length, file_size)?;
        let record = self.read(range).await?;
        let key = decode_key_header(&record, file_size)?
            .complete_or_truncated("key", record.len())?;
        if key.total_len as usize != record.len() {
            return Err(ParseError::new(
                "key",
                0,
                format!("record of {} bytes", record.len()),
                format!("key declaring {} bytes", key.total_len),
            )
            .into());
        }

        if depth + 1 < self.segments.len() {
            if !entry.is_directory() || key.is_compressed() {
                return Err(ParseError::new(
                    "key",
                    0,
                    "uncompressed TDirectory record",
                    format!("{} record, compressed: {}", key.class_name, key.is_compressed()),
                )
                .into());
            }
            let payload = &record[key.payload_offset()..];
            let dir = decode_directory_record(payload)?
                .complete_or_truncated("directory record", payload.len())?;
            entry.sub_entries = self.fetch_key_list(&dir, file_size).await?;
            return Ok(PipelineState::DirectoryFetched {
                file_size,
                directory: entry,
                depth: depth + 1,
            });
        }

        if key.class_name != "TTree" {
            return Err(ParseError::new("key", 0, "class TTree", key.class_name).into());
        }
        Ok(PipelineState::PayloadFetched { key, record })
    }

    async fn expand(
        &self,
        key: &RawRecordHeader,
        record: Bytes,
    ) -> Result<PipelineState, ScanError> {
        let payload = record.slice(key.payload_offset()..);
        let expected = key.uncompressed_len as usize;
        if !key.is_compressed() {
            if payload.len() != expected {
                return Err(ParseError::new(
                    "record",
                    key.payload_offset(),
                    format!("{expected} payload bytes"),
                    payload.len().to_string(),
                )
                .into());
            }
            return Ok(PipelineState::Decompressed { data: payload });
        }

        let blocks = decode_compressed_blocks(&payload, expected)?;
        let data = self.pool.decompress(blocks, expected).await?;
        Ok(PipelineState::Decompressed { data })
    }
}

/// Range of `length` bytes at `offset`, rejected if it runs past `file_size`.
fn checked_range(
    record: &'static str,
    offset: u64,
    length: u32,
    file_size: u64,
) -> Result<ByteRange, ParseError> {
    let range = ByteRange::new(offset, length);
    if range.end() > file_size {
        return Err(ParseError::new(
            record,
            offset as usize,
            format!("range within file of {file_size} bytes"),
            range.to_string(),
        ));
    }
    Ok(range)
}
