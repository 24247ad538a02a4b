//! I/O-free decoding of ROOT records.
//!
//! Every function here consumes an in-memory byte slice and either
//! produces a structure, reports how many more bytes it needs
//! ([`Decoded::NeedMore`]), or fails with a [`ParseError`]. Nothing here
//! reads from a source, retries, or keeps state between calls, so the
//! same code serves network, local and in-memory transports.
//!
//! All integers are big-endian, except the 3-byte sizes in a compression
//! block header which are little-endian.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::error::{ParseError, ScanError};

use super::structures::*;

/// Outcome of a decode that may run out of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Complete(T),
    /// The slice is too short; this many more bytes past its end are
    /// needed before decoding can make further progress.
    NeedMore(usize),
}

impl<T> Decoded<T> {
    /// Treat a shortfall as a truncated record.
    ///
    /// Used when the caller already holds every byte the record declared
    /// and a further read cannot help.
    pub fn complete_or_truncated(
        self,
        record: &'static str,
        len: usize,
    ) -> Result<T, ParseError> {
        match self {
            Decoded::Complete(value) => Ok(value),
            Decoded::NeedMore(n) => Err(ParseError::new(
                record,
                len,
                format!("{} bytes", len + n),
                format!("{len} bytes"),
            )),
        }
    }
}

pub type DecodeResult<T> = Result<Decoded<T>, ParseError>;

/// Streamed object byte counts carry this flag.
const BYTE_COUNT_MASK: u32 = 0x4000_0000;
/// A TObject version word with this bit set is the high half of a byte count.
const BYTE_COUNT_VERSION_MASK: u16 = 0x4000;
/// TObject bit meaning a process id follows the object header.
const IS_REFERENCED: u32 = 1 << 4;
/// The only tree class version whose layout is decoded.
const TREE_CLASS_VERSION: u16 = 20;
const ATT_LINE_CLASS_VERSION: u16 = 2;

enum Fault {
    NeedMore(usize),
    Parse(ParseError),
}

impl From<ParseError> for Fault {
    fn from(err: ParseError) -> Self {
        Fault::Parse(err)
    }
}

fn finish<T>(result: Result<T, Fault>) -> DecodeResult<T> {
    match result {
        Ok(value) => Ok(Decoded::Complete(value)),
        Err(Fault::NeedMore(n)) => Ok(Decoded::NeedMore(n)),
        Err(Fault::Parse(err)) => Err(err),
    }
}

/// Big-endian cursor that reports shortfalls instead of failing.
struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    record: &'static str,
}

macro_rules! read_be {
    ($name:ident, $ty:ty, $read:ident, $size:expr) => {
        fn $name(&mut self) -> Result<$ty, Fault> {
            self.require($size)?;
            self.cursor
                .$read::<BigEndian>()
                .map_err(|e| self.fail("readable field", e.to_string()))
        }
    };
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], record: &'static str) -> Self {
        Self::at(buf, 0, record)
    }

    fn at(buf: &'a [u8], pos: usize, record: &'static str) -> Self {
        let mut cursor = Cursor::new(buf);
        cursor.set_position(pos as u64);
        Self { cursor, record }
    }

    fn pos(&self) -> usize {
        self.cursor.position() as usize
    }

    fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    fn remaining(&self) -> usize {
        self.len().saturating_sub(self.pos())
    }

    fn require(&self, n: usize) -> Result<(), Fault> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(Fault::NeedMore(n - remaining));
        }
        Ok(())
    }

    /// Require the buffer to extend to absolute position `end`.
    fn require_until(&self, end: usize) -> Result<(), Fault> {
        if self.len() < end {
            return Err(Fault::NeedMore(end - self.len()));
        }
        Ok(())
    }

    fn fail(&self, expected: impl Into<String>, found: impl Into<String>) -> Fault {
        Fault::Parse(ParseError::new(self.record, self.pos(), expected, found))
    }

    fn u8(&mut self) -> Result<u8, Fault> {
        self.require(1)?;
        self.cursor
            .read_u8()
            .map_err(|e| self.fail("readable field", e.to_string()))
    }

    read_be!(u16, u16, read_u16, 2);
    read_be!(i16, i16, read_i16, 2);
    read_be!(u32, u32, read_u32, 4);
    read_be!(i32, i32, read_i32, 4);
    read_be!(u64, u64, read_u64, 8);
    read_be!(i64, i64, read_i64, 8);
    read_be!(f64, f64, read_f64, 8);

    /// 3-byte little-endian size used by compression block headers.
    fn u24_le(&mut self) -> Result<u32, Fault> {
        self.require(3)?;
        self.cursor
            .read_u24::<LittleEndian>()
            .map_err(|e| self.fail("readable field", e.to_string()))
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Fault> {
        self.require(n)?;
        let start = self.pos();
        let buf: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + n) as u64);
        Ok(&buf[start..start + n])
    }

    fn skip(&mut self, n: usize) -> Result<(), Fault> {
        self.bytes(n).map(|_| ())
    }

    fn seek(&mut self, pos: usize) -> Result<(), Fault> {
        self.require_until(pos)?;
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    /// Length-prefixed string: one length byte, or 255 followed by an i32.
    fn string(&mut self) -> Result<String, Fault> {
        let mut len = self.u8()? as usize;
        if len == 255 {
            let long = self.i32()?;
            len = usize::try_from(long)
                .map_err(|_| self.fail("non-negative string length", long.to_string()))?;
        }
        let raw = self.bytes(len)?;
        // Lossy conversion tolerates non-UTF8 names
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Seek field that is 32 or 64 bits wide depending on the record version.
    fn seek_field(&mut self, big: bool) -> Result<u64, Fault> {
        let value = if big {
            self.i64()?
        } else {
            self.i32()? as i64
        };
        u64::try_from(value).map_err(|_| self.fail("non-negative offset", value.to_string()))
    }

    fn non_negative(&self, value: i32, what: &str) -> Result<u32, Fault> {
        u32::try_from(value)
            .map_err(|_| self.fail(format!("non-negative {what}"), value.to_string()))
    }
}

/// Decode the file header at the start of `bytes`.
///
/// Fails if the leading magic is not `root`. Needs 12 bytes to learn the
/// layout, then 63 (small) or 75 (big) bytes in total.
///
/// # Arguments
///
/// * `bytes` - File contents from offset 0, possibly only a prefix
///
/// # Returns
///
/// The decoded header, or [`Decoded::NeedMore`] with the number of bytes
/// missing from the end of `bytes`.
pub fn decode_file_header(bytes: &[u8]) -> DecodeResult<FileHeader> {
    finish(file_header(&mut Reader::new(bytes, "file header")))
}

fn file_header(r: &mut Reader) -> Result<FileHeader, Fault> {
    r.require(FileHeader::PREFIX_SIZE)?;
    let magic = r.bytes(4)?;
    if magic != FILE_MAGIC {
        return Err(Fault::Parse(ParseError::new(
            "file header",
            0,
            format!("{:?}", String::from_utf8_lossy(FILE_MAGIC)),
            format!("{:?}", String::from_utf8_lossy(magic)),
        )));
    }
    let version = r.i32()?;
    let begin = r.i32()?;
    let big = version >= BIG_FILE_VERSION;
    let total = if big {
        FileHeader::BIG_SIZE
    } else {
        FileHeader::SMALL_SIZE
    };
    r.require_until(total)?;

    let begin = r.non_negative(begin, "fBEGIN")? as u64;
    let end = r.seek_field(big)?;
    let seek_free = r.seek_field(big)?;
    let nbytes_free = r.i32()?;
    let nfree = r.i32()?;
    let nbytes_name = r.i32()?;
    let units = r.u8()?;
    let compress = r.i32()?;
    let seek_info = r.seek_field(big)?;
    let nbytes_info = r.i32()?;
    let mut uuid = [0u8; 18];
    uuid.copy_from_slice(r.bytes(18)?);

    if begin < total as u64 || end < begin {
        return Err(r.fail(
            format!("{total} <= fBEGIN <= fEND"),
            format!("fBEGIN={begin}, fEND={end}"),
        ));
    }

    Ok(FileHeader {
        version,
        begin,
        end,
        seek_free,
        nbytes_free,
        nfree,
        nbytes_name,
        units,
        compress,
        seek_info,
        nbytes_info,
        uuid,
    })
}

/// Decode a key (record header) at the start of `bytes`.
///
/// `file_size` is the `fEND` of the file header: a key whose record would
/// extend past it is rejected rather than truncated.
///
/// # Arguments
///
/// * `bytes` - Buffer starting at the first byte of the key
/// * `file_size` - Size of the file the key was read from
///
/// # Returns
///
/// The decoded key once all `fKeylen` bytes are present, or
/// [`Decoded::NeedMore`] with the shortfall.
pub fn decode_key_header(bytes: &[u8], file_size: u64) -> DecodeResult<RawRecordHeader> {
    finish(key(&mut Reader::new(bytes, "key"), file_size))
}

fn key(r: &mut Reader, file_size: u64) -> Result<RawRecordHeader, Fault> {
    let start = r.pos();
    r.require(RawRecordHeader::FIXED_SIZE)?;
    let nbytes = r.i32()?;
    let version = r.i16()?;
    let objlen = r.i32()?;
    let datime = r.u32()?;
    let keylen = r.i16()?;
    let cycle = r.i16()?;

    let total_len = r.non_negative(nbytes, "fNbytes")?;
    let uncompressed_len = r.non_negative(objlen, "fObjlen")?;
    let key_len = u16::try_from(keylen)
        .ok()
        .filter(|&k| k as usize >= RawRecordHeader::FIXED_SIZE && k as u32 <= total_len)
        .ok_or_else(|| r.fail(format!("key length within 18..={total_len}"), keylen.to_string()))?;
    // The whole key is needed from here on; ask for it in one go.
    r.require_until(start + key_len as usize)?;

    let big = version > BIG_RECORD_VERSION;
    let seek_key = r.seek_field(big)?;
    let seek_pdir = r.seek_field(big)?;
    let class_name = r.string()?;
    let name = r.string()?;
    let title = r.string()?;

    let consumed = r.pos() - start;
    if consumed != key_len as usize {
        return Err(r.fail(
            format!("key of {key_len} bytes"),
            format!("{consumed} bytes decoded"),
        ));
    }
    if seek_key + total_len as u64 > file_size {
        return Err(r.fail(
            format!("record ending within file of {file_size} bytes"),
            format!("{total_len} bytes at offset {seek_key}"),
        ));
    }

    Ok(RawRecordHeader {
        total_len,
        version,
        uncompressed_len,
        datime,
        key_len,
        cycle,
        seek_key,
        seek_pdir,
        class_name,
        name,
        title,
    })
}

/// Decode the streamed part of a directory record.
///
/// For subdirectories this is the whole payload of their key.
pub fn decode_directory_record(bytes: &[u8]) -> DecodeResult<DirectoryRecord> {
    finish(directory_record(&mut Reader::new(bytes, "directory record")))
}

fn directory_record(r: &mut Reader) -> Result<DirectoryRecord, Fault> {
    let version = r.i16()?;
    let datime_c = r.u32()?;
    let datime_m = r.u32()?;
    let nbytes_keys = r.i32()?;
    let nbytes_name = r.i32()?;
    let big = version > BIG_RECORD_VERSION;
    let seek_dir = r.seek_field(big)?;
    let seek_parent = r.seek_field(big)?;
    let seek_keys = r.seek_field(big)?;
    Ok(DirectoryRecord {
        version,
        datime_c,
        datime_m,
        nbytes_keys: r.non_negative(nbytes_keys, "fNbytesKeys")?,
        nbytes_name: r.non_negative(nbytes_name, "fNbytesName")?,
        seek_dir,
        seek_parent,
        seek_keys,
    })
}

/// Decode the root directory from a buffer that starts at file offset 0.
///
/// The root key sits at `fBEGIN` and must point at itself; the file's
/// name and title and the directory record follow it. Reports the exact
/// shortfall when the buffer stops early.
pub fn decode_root_directory(bytes: &[u8], header: &FileHeader) -> DecodeResult<RootDirectory> {
    finish(root_directory(bytes, header))
}

fn root_directory(bytes: &[u8], header: &FileHeader) -> Result<RootDirectory, Fault> {
    let mut r = Reader::new(bytes, "root directory");
    let begin = usize::try_from(header.begin)
        .map_err(|_| r.fail("addressable fBEGIN", header.begin.to_string()))?;
    r.seek(begin)?;
    let key = key(&mut r, header.end)?;
    if key.seek_key != header.begin {
        return Err(r.fail(
            format!("root key pointing at fBEGIN={}", header.begin),
            format!("fSeekKey={}", key.seek_key),
        ));
    }
    // Stored uncompressed, so the object must fit inside the key's record.
    if key.key_len as u64 + key.uncompressed_len as u64 > key.total_len as u64 {
        return Err(r.fail(
            format!("object within the {}-byte root record", key.total_len),
            format!("fKeylen={} + fObjlen={}", key.key_len, key.uncompressed_len),
        ));
    }
    r.require(key.uncompressed_len as usize)?;
    let name = r.string()?;
    let title = r.string()?;
    let record = directory_record(&mut r)?;
    Ok(RootDirectory {
        key,
        name,
        title,
        record,
    })
}

/// Decode a key list: a header key, a key count, then that many keys.
///
/// # Arguments
///
/// * `bytes` - The `fNbytesKeys` bytes at the directory's `fSeekKeys`
/// * `file_size` - Size of the file, bounding every listed record
///
/// # Returns
///
/// The listed keys in declared order.
pub fn decode_directory(bytes: &[u8], file_size: u64) -> DecodeResult<Vec<DirectoryEntry>> {
    finish(directory(&mut Reader::new(bytes, "key list"), file_size))
}

fn directory(r: &mut Reader, file_size: u64) -> Result<Vec<DirectoryEntry>, Fault> {
    let head = key(r, file_size)?;
    let end = r.pos() + head.uncompressed_len as usize;
    let count = r.i32()?;
    let count = r.non_negative(count, "key count")? as usize;
    let entries = entries(r, count, file_size)?;
    if r.pos() > end {
        return Err(r.fail(
            format!("key list ending at {end}"),
            format!("keys running to {}", r.pos()),
        ));
    }
    Ok(entries)
}

/// Decode `count` consecutive keys from the start of `bytes`, in order.
pub fn decode_directory_entries(
    bytes: &[u8],
    count: usize,
    file_size: u64,
) -> DecodeResult<Vec<DirectoryEntry>> {
    finish(entries(&mut Reader::new(bytes, "key list"), count, file_size))
}

fn entries(r: &mut Reader, count: usize, file_size: u64) -> Result<Vec<DirectoryEntry>, Fault> {
    // Cap the preallocation; the count comes from untrusted bytes.
    let mut out = Vec::with_capacity(count.min(r.remaining() / RawRecordHeader::FIXED_SIZE + 1));
    for _ in 0..count {
        let key = key(r, file_size)?;
        out.push(DirectoryEntry::from_key(&key));
    }
    Ok(out)
}

/// Split a compressed record payload into its blocks.
///
/// `expected_len` is the record's declared uncompressed length; the
/// block headers must account for exactly that many bytes. Blocks share
/// `payload`'s allocation.
pub fn decode_compressed_blocks(
    payload: &Bytes,
    expected_len: usize,
) -> Result<Vec<CompressedBlock>, ScanError> {
    let mut r = Reader::new(payload, "compression block");
    let mut blocks = Vec::new();
    let mut total = 0usize;
    while r.remaining() > 0 {
        let start = r.pos();
        let block = match compressed_block(&mut r, payload) {
            Ok(block) => block,
            Err(Fault::Parse(err)) => return Err(err.into()),
            Err(Fault::NeedMore(n)) => {
                return Err(ParseError::new(
                    "compression block",
                    start,
                    format!("{n} more bytes"),
                    "end of payload",
                )
                .into());
            }
        }?;
        total += block.uncompressed_len as usize;
        blocks.push(block);
    }
    if total != expected_len {
        return Err(ScanError::decompression(format!(
            "block headers declare {total} uncompressed bytes, key declares {expected_len}"
        )));
    }
    Ok(blocks)
}

fn compressed_block(
    r: &mut Reader,
    payload: &Bytes,
) -> Result<Result<CompressedBlock, ScanError>, Fault> {
    r.require(CompressedBlock::HEADER_SIZE)?;
    let magic = r.bytes(2)?;
    let _method = r.u8()?;
    let compressed_len = r.u24_le()? as usize;
    let uncompressed_len = r.u24_le()?;
    let Some(algorithm) = CompressionAlgorithm::from_magic(magic) else {
        return Ok(Err(ScanError::UnsupportedCompression {
            tag: String::from_utf8_lossy(magic).into_owned(),
        }));
    };

    let (checksum, data_len) = if algorithm == CompressionAlgorithm::Lz4 {
        if compressed_len < CompressedBlock::CHECKSUM_SIZE {
            return Err(r.fail("lz4 block of at least 8 bytes", compressed_len.to_string()));
        }
        (Some(r.u64()?), compressed_len - CompressedBlock::CHECKSUM_SIZE)
    } else {
        (None, compressed_len)
    };
    r.require(data_len)?;
    let start = r.pos();
    r.skip(data_len)?;

    Ok(Ok(CompressedBlock {
        algorithm,
        data: payload.slice(start..start + data_len),
        uncompressed_len,
        checksum,
    }))
}

/// Header of a streamed object: byte count and class version.
struct Streamed {
    version: u16,
    /// Absolute position just past the object.
    end: usize,
}

fn streamed(r: &mut Reader) -> Result<Streamed, Fault> {
    let start = r.pos();
    let count = r.u32()?;
    if count & BYTE_COUNT_MASK == 0 {
        return Err(r.fail("byte count with 0x40000000 set", format!("{count:#010x}")));
    }
    let size = (count & !BYTE_COUNT_MASK) as usize;
    if size < 2 {
        return Err(r.fail("byte count covering the version", size.to_string()));
    }
    let version = r.u16()?;
    Ok(Streamed {
        version,
        end: start + 4 + size,
    })
}

fn expect_end(r: &Reader, obj: &Streamed, what: &str) -> Result<(), Fault> {
    if r.pos() != obj.end {
        return Err(r.fail(
            format!("{what} ending at {}", obj.end),
            format!("decoding stopped at {}", r.pos()),
        ));
    }
    Ok(())
}

/// Skip the TObject fields embedded in a streamed object.
fn tobject(r: &mut Reader) -> Result<(), Fault> {
    let version = r.u16()?;
    if version & BYTE_COUNT_VERSION_MASK != 0 {
        r.skip(4)?;
    }
    let _unique_id = r.u32()?;
    let bits = r.u32()?;
    if bits & IS_REFERENCED != 0 {
        r.skip(2)?;
    }
    Ok(())
}

/// Decode a decompressed tree record into its metadata.
///
/// The record must be complete; a short buffer is a [`ParseError`].
///
/// # Arguments
///
/// * `bytes` - The whole uncompressed tree record
///
/// # Returns
///
/// The tree's name, entry count and top-level branch count.
pub fn decode_tree_metadata(bytes: &[u8]) -> Result<TreeMetadata, ParseError> {
    let mut r = Reader::new(bytes, "tree");
    finish(tree(&mut r))?.complete_or_truncated("tree", bytes.len())
}

fn tree(r: &mut Reader) -> Result<TreeMetadata, Fault> {
    let tree = streamed(r)?;
    if tree.version != TREE_CLASS_VERSION {
        return Err(r.fail(
            format!("tree class version {TREE_CLASS_VERSION}"),
            tree.version.to_string(),
        ));
    }

    // TNamed
    let named = streamed(r)?;
    tobject(r)?;
    let name = r.string()?;
    let _title = r.string()?;
    expect_end(r, &named, "TNamed")?;

    // TAttLine
    let line = streamed(r)?;
    if line.version != ATT_LINE_CLASS_VERSION {
        return Err(r.fail(
            format!("TAttLine version {ATT_LINE_CLASS_VERSION}"),
            line.version.to_string(),
        ));
    }
    r.skip(6)?;
    expect_end(r, &line, "TAttLine")?;

    // TAttFill, TAttMarker
    for _ in 0..2 {
        let att = streamed(r)?;
        r.seek(att.end)?;
    }

    let entries = r.i64()?;
    if entries < 0 {
        return Err(r.fail("non-negative entry count", entries.to_string()));
    }
    // fTotBytes, fZipBytes, fSavedBytes, fFlushedBytes
    r.skip(4 * 8)?;
    let _weight = r.f64()?;
    // fTimerInterval, fScanField, fUpdate, fDefaultEntryOffsetLen
    r.skip(4 * 4)?;
    let cluster_ranges = r.u32()? as usize;
    // fMaxEntries, fMaxEntryLoop, fMaxVirtualSize, fAutoSave, fAutoFlush, fEstimate
    r.skip(6 * 8)?;

    // fClusterRangeEnd, fClusterSize: array marker then values
    for _ in 0..2 {
        let _marker = r.u8()?;
        r.skip(cluster_ranges.saturating_mul(8))?;
    }

    // fIOFeatures
    let features = streamed(r)?;
    r.seek(features.end)?;

    // fBranches (TObjArray)
    let _array = streamed(r)?;
    tobject(r)?;
    let _array_name = r.string()?;
    let count = r.i32()?;
    let branches = r.non_negative(count, "branch count")?;

    Ok(TreeMetadata {
        name,
        entries,
        branches,
    })
}
