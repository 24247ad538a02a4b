//! Block decompressors, selected by the algorithm named in each block
//! header. Pure and synchronous; callers run them on the worker pool.

use flate2::read::ZlibDecoder;
use std::io::Read;
use xxhash_rust::xxh64::xxh64;

use crate::error::ScanError;

use super::structures::{CompressedBlock, CompressionAlgorithm};

/// Decompress a single block, checking its declared uncompressed length.
pub fn decompress_block(block: &CompressedBlock) -> Result<Vec<u8>, ScanError> {
    let expected = block.uncompressed_len as usize;
    let out = match block.algorithm {
        CompressionAlgorithm::Zlib => {
            let mut out = Vec::with_capacity(expected);
            ZlibDecoder::new(block.data.as_ref())
                .take(expected as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|e| ScanError::decompression(format!("zlib: {e}")))?;
            out
        }
        CompressionAlgorithm::Zstd => zstd::bulk::decompress(&block.data, expected)
            .map_err(|e| ScanError::decompression(format!("zstd: {e}")))?,
        CompressionAlgorithm::Lz4 => {
            if let Some(checksum) = block.checksum {
                let actual = xxh64(&block.data, 0);
                if actual != checksum {
                    return Err(ScanError::decompression(format!(
                        "lz4 checksum mismatch: header {checksum:#018x}, data {actual:#018x}"
                    )));
                }
            }
            lz4_flex::block::decompress(&block.data, expected)
                .map_err(|e| ScanError::decompression(format!("lz4: {e}")))?
        }
        CompressionAlgorithm::Lzma | CompressionAlgorithm::OldRoot => {
            return Err(ScanError::UnsupportedCompression {
                tag: block.algorithm.name().to_string(),
            });
        }
    };

    if out.len() != expected {
        return Err(ScanError::decompression(format!(
            "{} block expanded to {} bytes, header declares {expected}",
            block.algorithm.name(),
            out.len()
        )));
    }
    Ok(out)
}

/// Decompress a record's blocks in order into one buffer of `expected_len` bytes.
pub fn decompress_payload(
    blocks: &[CompressedBlock],
    expected_len: usize,
) -> Result<Vec<u8>, ScanError> {
    let mut out = Vec::with_capacity(expected_len);
    for block in blocks {
        out.extend_from_slice(&decompress_block(block)?);
    }
    if out.len() != expected_len {
        return Err(ScanError::decompression(format!(
            "payload expanded to {} bytes, key declares {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}
