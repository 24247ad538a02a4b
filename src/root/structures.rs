use bytes::Bytes;

/// Leading magic of every ROOT file.
pub const FILE_MAGIC: &[u8] = b"root";

/// File versions at or above this use 64-bit seek fields in the header.
pub const BIG_FILE_VERSION: i32 = 1_000_000;

/// Key and directory versions above this use 64-bit seek fields.
pub const BIG_RECORD_VERSION: i16 = 1000;

/// Compression algorithms a payload block header may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Zlib,
    Lzma,
    OldRoot,
    Lz4,
    Zstd,
}

impl CompressionAlgorithm {
    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        match magic {
            b"ZL" => Some(Self::Zlib),
            b"XZ" => Some(Self::Lzma),
            b"CS" => Some(Self::OldRoot),
            b"L4" => Some(Self::Lz4),
            b"ZS" => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn magic(&self) -> &'static [u8; 2] {
        match self {
            Self::Zlib => b"ZL",
            Self::Lzma => b"XZ",
            Self::OldRoot => b"CS",
            Self::Lz4 => b"L4",
            Self::Zstd => b"ZS",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zlib => "zlib",
            Self::Lzma => "lzma",
            Self::OldRoot => "old-root",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// File header found at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: i32,
    /// Offset of the root directory key.
    pub begin: u64,
    /// Offset of the end of the file, i.e. the file size.
    pub end: u64,
    pub seek_free: u64,
    pub nbytes_free: i32,
    pub nfree: i32,
    /// Root key length plus the file's name and title.
    pub nbytes_name: i32,
    pub units: u8,
    pub compress: i32,
    pub seek_info: u64,
    pub nbytes_info: i32,
    pub uuid: [u8; 18],
}

impl FileHeader {
    /// Bytes needed before the layout (small or big) is known.
    pub const PREFIX_SIZE: usize = 12;
    pub const SMALL_SIZE: usize = 63;
    pub const BIG_SIZE: usize = 75;

    pub fn is_big(&self) -> bool {
        self.version >= BIG_FILE_VERSION
    }
}

/// Decoded key (TKey): the fixed prefix of every record in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecordHeader {
    /// Total record length on disk, key included.
    pub total_len: u32,
    pub version: i16,
    /// Payload length after decompression.
    pub uncompressed_len: u32,
    pub datime: u32,
    /// Key length; the payload starts this many bytes into the record.
    pub key_len: u16,
    pub cycle: i16,
    pub seek_key: u64,
    pub seek_pdir: u64,
    pub class_name: String,
    pub name: String,
    pub title: String,
}

impl RawRecordHeader {
    /// Fixed-size part preceding the seek fields.
    pub const FIXED_SIZE: usize = 18;

    pub fn is_compressed(&self) -> bool {
        (self.total_len as u64) < self.key_len as u64 + self.uncompressed_len as u64
    }

    pub fn payload_offset(&self) -> usize {
        self.key_len as usize
    }

    /// On-disk payload length (compressed if the record is compressed).
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.key_len as usize)
    }
}

/// Streamed part of a directory record (TDirectory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub version: i16,
    pub datime_c: u32,
    pub datime_m: u32,
    pub nbytes_keys: u32,
    pub nbytes_name: u32,
    pub seek_dir: u64,
    pub seek_parent: u64,
    pub seek_keys: u64,
}

/// The top-level directory: its key, the file's name and title, and the
/// directory record that locates the key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDirectory {
    pub key: RawRecordHeader,
    pub name: String,
    pub title: String,
    pub record: DirectoryRecord,
}

impl RootDirectory {
    /// Directory entry standing for the root directory itself, with no
    /// sub-entries fetched yet.
    pub fn to_entry(&self) -> DirectoryEntry {
        DirectoryEntry::from_key(&self.key)
    }
}

/// One named key inside a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub class_name: String,
    pub cycle: i16,
    pub record_offset: u64,
    pub record_length: u32,
    pub key_len: u16,
    /// Entries of a nested directory, in declared order. Empty until the
    /// directory has been fetched.
    pub sub_entries: Vec<DirectoryEntry>,
}

impl DirectoryEntry {
    pub fn from_key(key: &RawRecordHeader) -> Self {
        Self {
            name: key.name.clone(),
            class_name: key.class_name.clone(),
            cycle: key.cycle,
            record_offset: key.seek_key,
            record_length: key.total_len,
            key_len: key.key_len,
            sub_entries: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.class_name.as_str(), "TDirectory" | "TDirectoryFile")
    }

    pub fn is_tree(&self) -> bool {
        self.class_name == "TTree"
    }

    /// Look up a direct child by name, optionally suffixed with `;cycle`.
    ///
    /// Without an explicit cycle the first entry with that name in
    /// declared order wins.
    pub fn find(&self, requested: &str) -> Option<&DirectoryEntry> {
        find_entry(&self.sub_entries, requested)
    }
}

/// Look up `requested` (a bare name or `name;cycle`) among `entries`.
pub fn find_entry<'a>(
    entries: &'a [DirectoryEntry],
    requested: &str,
) -> Option<&'a DirectoryEntry> {
    let (name, cycle) = split_cycle(requested);
    entries
        .iter()
        .find(|e| e.name == name && cycle.is_none_or(|c| e.cycle == c))
}

/// Split `name;cycle` into its parts. A suffix that is not a number is
/// treated as part of the name.
pub fn split_cycle(requested: &str) -> (&str, Option<i16>) {
    match requested.rsplit_once(';') {
        Some((name, cycle)) => match cycle.parse() {
            Ok(cycle) => (name, Some(cycle)),
            Err(_) => (requested, None),
        },
        None => (requested, None),
    }
}

/// Structural metadata of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMetadata {
    pub name: String,
    pub entries: i64,
    pub branches: u32,
}

/// One compressed block of a record payload.
///
/// Owned by the pipeline step that sliced it out of the record until it
/// is handed to the decompression pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    pub algorithm: CompressionAlgorithm,
    pub data: Bytes,
    pub uncompressed_len: u32,
    /// XXH64 of `data`, carried by LZ4 blocks only.
    pub checksum: Option<u64>,
}

impl CompressedBlock {
    pub const HEADER_SIZE: usize = 9;
    pub const CHECKSUM_SIZE: usize = 8;
}
