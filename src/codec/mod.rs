//! Compression codec registry (§4.5).
//!
//! Every codec exposes the same push-style shape: compress/decompress the
//! whole buffer. Errors map to a small taxonomy: format (corrupt input),
//! memory (allocator failure), assert (library misuse).

use std::io::{Read, Write};
use thiserror::Error;

/// Compression type, as named on the wire (`compress-type` option values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressType {
    None,
    Gz,
    Bz2,
    Lz4,
    Zst,
}

impl CompressType {
    pub fn name(self) -> &'static str {
        match self {
            CompressType::None => "none",
            CompressType::Gz => "gz",
            CompressType::Bz2 => "bz2",
            CompressType::Lz4 => "lz4",
            CompressType::Zst => "zst",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CompressType::None),
            "gz" => Some(CompressType::Gz),
            "bz2" => Some(CompressType::Bz2),
            "lz4" => Some(CompressType::Lz4),
            "zst" => Some(CompressType::Zst),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("memory error: {0}")]
    Memory(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Codec: Send + Sync {
    fn compress_type(&self) -> CompressType;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Headerless counterpart used where the compression context (type,
    /// decoded size) already travels out-of-band — the block-delta engine's
    /// super-block framing, matching `crypto::encrypt_raw`/`decrypt_raw`
    /// (§4.3 step 3, §4.5). `expected_size` is the decoded size from the
    /// block map, needed by codecs whose raw frame carries no length.
    ///
    /// Defaults to the framed form for codecs whose crate exposes no safe
    /// single-shot raw primitive (bz2, zstd); those two carry a small,
    /// fixed header overhead in raw mode as a result.
    fn compress_raw(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        self.compress(data, level)
    }
    fn decompress_raw(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        let _ = expected_size;
        self.decompress(data)
    }
}

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn compress_type(&self) -> CompressType {
        CompressType::None
    }
    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
}

pub struct GzCodec;
impl Codec for GzCodec {
    fn compress_type(&self) -> CompressType {
        CompressType::Gz
    }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::new(level.clamp(0, 9) as u32));
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        use flate2::read::GzDecoder;
        let mut out = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }

    /// Raw deflate with negative window bits — no gzip header/trailer,
    /// mirroring the source's `gzipWindowBits(raw)`.
    fn compress_raw(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::new(level.clamp(0, 9) as u32));
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress_raw(&self, data: &[u8], _expected_size: usize) -> Result<Vec<u8>, CodecError> {
        use flate2::read::DeflateDecoder;
        let mut out = Vec::new();
        DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct Bz2Codec;
impl Codec for Bz2Codec {
    fn compress_type(&self) -> CompressType {
        CompressType::Bz2
    }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        let mut enc = BzEncoder::new(Vec::new(), Compression::new(level.clamp(1, 9) as u32));
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        use bzip2::read::BzDecoder;
        let mut out = Vec::new();
        BzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compress_type(&self) -> CompressType {
        CompressType::Lz4
    }
    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }

    /// Raw LZ4 block — no size prefix; the caller supplies the decoded size
    /// from the block map instead.
    fn compress_raw(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress(data))
    }

    fn decompress_raw(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress(data, expected_size).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct ZstCodec;
impl Codec for ZstCodec {
    fn compress_type(&self) -> CompressType {
        CompressType::Zst
    }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

/// Resolve a `CompressType` to its codec implementation.
pub fn get_codec(id: CompressType) -> Box<dyn Codec> {
    match id {
        CompressType::None => Box::new(NoneCodec),
        CompressType::Gz => Box::new(GzCodec),
        CompressType::Bz2 => Box::new(Bz2Codec),
        CompressType::Lz4 => Box::new(Lz4Codec),
        CompressType::Zst => Box::new(ZstCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_codecs() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(37);
        for ct in [CompressType::None, CompressType::Gz, CompressType::Bz2, CompressType::Lz4, CompressType::Zst] {
            let codec = get_codec(ct);
            let compressed = codec.compress(&data, 3).unwrap();
            let decompressed = codec.decompress(&compressed).unwrap();
            assert_eq!(decompressed, data, "round-trip failed for {:?}", ct.name());
        }
    }

    #[test]
    fn raw_round_trip_gz_and_lz4() {
        let data = b"raw mode payload with no framing header at all".repeat(11);
        for ct in [CompressType::Gz, CompressType::Lz4] {
            let codec = get_codec(ct);
            let compressed = codec.compress_raw(&data, 3).unwrap();
            let decompressed = codec.decompress_raw(&compressed, data.len()).unwrap();
            assert_eq!(decompressed, data, "raw round-trip failed for {:?}", ct.name());
        }
    }
}
