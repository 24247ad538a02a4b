//! ROOT container decoding.
//!
//! Only the records needed to reach a tree's entry count are covered:
//!
//! - [`structures`]: the decoded record types (file header, keys,
//!   directories, compressed blocks, tree metadata)
//! - [`decoder`]: sans-I/O decoding from byte slices
//! - [`compression`]: per-block decompressors
//!
//! ## Layout Overview
//!
//! A ROOT file starts with a fixed header naming `fBEGIN`, where the root
//! directory's key and record live. The directory record points at a key
//! list, one key per named object. A key locates its object's record,
//! whose payload is optionally split into compressed blocks. Reaching a
//! tree therefore takes three dependent reads: header, key list, record.
//!
//! ## Limitations
//!
//! - Only tree class version 20 is decoded
//! - No LZMA or legacy ROOT compression
//! - Read-only; nothing here writes ROOT files

pub mod compression;
pub mod decoder;
pub mod structures;

pub use compression::{decompress_block, decompress_payload};
pub use decoder::{
    DecodeResult, Decoded, decode_compressed_blocks, decode_directory, decode_directory_entries,
    decode_directory_record, decode_file_header, decode_key_header, decode_root_directory,
    decode_tree_metadata,
};
pub use structures::*;
