//! Codec registry: numeric on-disk identities + the [`Codec`] trait.
//!
//! # Identity rules
//! Every codec is identified by one byte.  That byte is written into the
//! container header of every stored entry, so the values below are
//! permanent: an id is never reused, even if a codec is retired.
//! A reader that meets an unknown id MUST fail for that entry; it never
//! guesses another codec.

use std::io::{self, Read, Write};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Frozen codec ids ─────────────────────────────────────────────────────────

/// No compression: payload stored verbatim.
pub const ID_NONE:   u8 = 0;
/// Zstandard: balanced speed/ratio (default).
pub const ID_ZSTD:   u8 = 1;
/// LZ4: maximum throughput, lower ratio.
pub const ID_LZ4:    u8 = 2;
/// Brotli: high ratio, good on source code and text.
pub const ID_BROTLI: u8 = 3;
/// LZMA: highest ratio, slowest codec.
pub const ID_LZMA:   u8 = 4;

// ── CodecId enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    None,
    Zstd,
    Lz4,
    Brotli,
    Lzma,
}

impl CodecId {
    /// The byte written into container headers.
    #[inline]
    pub fn id(self) -> u8 {
        match self {
            CodecId::None   => ID_NONE,
            CodecId::Zstd   => ID_ZSTD,
            CodecId::Lz4    => ID_LZ4,
            CodecId::Brotli => ID_BROTLI,
            CodecId::Lzma   => ID_LZMA,
        }
    }

    /// Resolve an on-disk id.  Returns `None` if this build does not know it.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            ID_NONE   => Some(CodecId::None),
            ID_ZSTD   => Some(CodecId::Zstd),
            ID_LZ4    => Some(CodecId::Lz4),
            ID_BROTLI => Some(CodecId::Brotli),
            ID_LZMA   => Some(CodecId::Lzma),
            _         => None,
        }
    }

    /// Human-readable name (for diagnostics only: never parsed from disk).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None   => "none",
            CodecId::Zstd   => "zstd",
            CodecId::Lz4    => "lz4",
            CodecId::Brotli => "brotli",
            CodecId::Lzma   => "lzma",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"   => Some(CodecId::None),
            "zstd"   => Some(CodecId::Zstd),
            "lz4"    => Some(CodecId::Lz4),
            "brotli" => Some(CodecId::Brotli),
            "lzma"   => Some(CodecId::Lzma),
            _        => None,
        }
    }
}

impl Default for CodecId {
    fn default() -> Self { CodecId::Zstd }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The entry was written with a codec id this build does not carry.
    #[error("Codec id {0} not available in this build")]
    UnavailableCodec(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8])        -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn codec_id(&self) -> CodecId { CodecId::Brotli }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn codec_id(&self) -> CodecId { CodecId::Lzma }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve an on-disk id to a built-in codec.
///
/// Returns `Err(CodecError::UnavailableCodec)` if the id is not recognised.
pub fn get_codec_by_id(id: u8) -> Result<Box<dyn Codec>, CodecError> {
    match CodecId::from_id(id) {
        Some(codec) => Ok(get_codec(codec)),
        None        => Err(CodecError::UnavailableCodec(id)),
    }
}

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None   => Box::new(NoneCodec),
        CodecId::Zstd   => Box::new(ZstdCodec),
        CodecId::Lz4    => Box::new(Lz4Codec),
        CodecId::Brotli => Box::new(BrotliCodec),
        CodecId::Lzma   => Box::new(LzmaCodec),
    }
}
